// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Versioned packed-record values.
//!
//! A value under a [`ValueDescriptor`] is a concatenation of fixed-size
//! records, tagged with the descriptor's format version in the entry's
//! user-meta and optionally carrying a TTL. A stored value whose version is
//! behind the descriptor's is migrated in place on the next mutating access;
//! readers of old data therefore self-heal on first touch.

use std::time::Duration;

use crate::kv::Txn;

use super::IndexError;

/// Rewrites a value from an older format version to the current one.
pub type Migrator = fn(&[u8], u8) -> Result<Vec<u8>, IndexError>;

/// Static configuration of one versioned value family.
pub struct ValueDescriptor {
    /// Current format version, written to user-meta on every store.
    pub version: u8,
    /// Fixed record size in bytes; `|value| % size == 0` always holds.
    pub size: usize,
    pub ttl: Option<Duration>,
    pub migrate: Option<Migrator>,
}

impl ValueDescriptor {
    /// Migrates `stored` if its version is stale. The bool reports whether
    /// the value changed and must be rewritten.
    fn migrated(&self, stored: Vec<u8>, version: u8) -> Result<(Vec<u8>, bool), IndexError> {
        if version == self.version {
            return Ok((stored, false));
        }
        match self.migrate {
            Some(migrate) => Ok((migrate(&stored, version)?, true)),
            None => Err(IndexError::UnsupportedVersion { version }),
        }
    }
}

/// Appends `record` to the value at `key`, creating it if absent.
pub fn append_record(
    txn: &Txn,
    key: &[u8],
    record: &[u8],
    desc: &ValueDescriptor,
) -> Result<(), IndexError> {
    debug_assert_eq!(record.len(), desc.size);
    let Some((stored, version)) = txn.get(key)? else {
        txn.set_entry(key, record, desc.version, desc.ttl)?;
        return Ok(());
    };
    let (mut stored, _) = desc.migrated(stored, version)?;
    stored.extend_from_slice(record);
    txn.set_entry(key, &stored, desc.version, desc.ttl)?;
    Ok(())
}

/// Like [`append_record`], but the stored value is a set: the append is
/// skipped when an equal record window already exists.
///
/// `filter` is applied to the whole value afterwards; an empty result
/// deletes the key. The entry is rewritten only when something changed:
/// migration, append, or a filter trim.
pub fn append_unique(
    txn: &Txn,
    key: &[u8],
    record: &[u8],
    filter: Option<&dyn Fn(Vec<u8>) -> Vec<u8>>,
    desc: &ValueDescriptor,
) -> Result<(), IndexError> {
    debug_assert_eq!(record.len(), desc.size);
    let Some((stored, version)) = txn.get(key)? else {
        txn.set_entry(key, record, desc.version, desc.ttl)?;
        return Ok(());
    };
    let (mut stored, mut updated) = desc.migrated(stored, version)?;

    let exists = stored
        .chunks_exact(desc.size)
        .rev()
        .any(|window| window == record);
    if !exists {
        stored.extend_from_slice(record);
        updated = true;
    }

    if let Some(filter) = filter {
        let len_before = stored.len();
        stored = filter(stored);
        if stored.is_empty() {
            txn.delete(key)?;
            return Ok(());
        }
        if stored.len() != len_before {
            updated = true;
        }
    }

    if updated {
        txn.set_entry(key, &stored, desc.version, desc.ttl)?;
    }
    Ok(())
}

/// Removes the last record window equal to `record` (or all of them when
/// `all`). Deletes the key when the value ends up empty.
pub fn remove_record(
    txn: &Txn,
    key: &[u8],
    record: &[u8],
    all: bool,
    desc: &ValueDescriptor,
) -> Result<(), IndexError> {
    debug_assert_eq!(record.len(), desc.size);
    let Some((stored, version)) = txn.get(key)? else {
        return Ok(());
    };
    let (mut stored, mut updated) = desc.migrated(stored, version)?;

    let size = desc.size;
    let mut i = stored.len() / size;
    while i > 0 {
        i -= 1;
        if &stored[i * size..(i + 1) * size] == record {
            stored.drain(i * size..(i + 1) * size);
            updated = true;
            if !all {
                break;
            }
        }
    }

    if stored.is_empty() {
        txn.delete(key)?;
        return Ok(());
    }
    if updated {
        txn.set_entry(key, &stored, desc.version, desc.ttl)?;
    }
    Ok(())
}
