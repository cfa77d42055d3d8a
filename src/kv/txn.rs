// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction wrapper with the value envelope and write budget.
//!
//! The substrate stores every value behind a 9-byte envelope:
//! `[user_meta: u8][expires_at_unix_secs: u64 BE][payload]`. The meta byte
//! carries the caller's format version (or blob encoding), `expires_at = 0`
//! means no expiry. Reads and iteration treat expired entries as absent;
//! physical removal happens in the GC sweep.

use std::cell::Cell;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rocksdb::{DBRawIteratorWithThreadMode, OptimisticTransactionDB, Transaction};

use crate::codec::{ByteBuf, ByteReader};

use super::KvError;

pub(crate) const ENVELOPE_LEN: usize = 9;

/// Per-transaction write budget. Exceeding either bound yields
/// [`KvError::TxnTooBig`] from the mutating call; nothing is buffered for it.
const MAX_TXN_OPS: usize = 100_000;
const MAX_TXN_BYTES: usize = 64 << 20;

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn encode_value(meta: u8, expires_at: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = ByteBuf::fixed(ENVELOPE_LEN + payload.len());
    buf.write_u8(meta);
    buf.write_u64(expires_at);
    buf.write(payload);
    buf.into_vec()
}

fn decode_value(raw: &[u8]) -> Result<(u8, u64, &[u8]), KvError> {
    if raw.len() < ENVELOPE_LEN {
        return Err(KvError::Corruption(format!(
            "value shorter than envelope: {} bytes",
            raw.len()
        )));
    }
    let mut reader = ByteReader::new(raw);
    let meta = reader.read_u8();
    let expires_at = reader.read_u64();
    Ok((meta, expires_at, &raw[ENVELOPE_LEN..]))
}

/// A transaction over the substrate.
///
/// Update transactions read through `get_for_update` so the read set is
/// validated at commit; read-only transactions read without conflict
/// tracking. Dropping an uncommitted transaction discards it.
pub struct Txn<'db> {
    inner: Transaction<'db, OptimisticTransactionDB>,
    update: bool,
    pending_ops: Cell<usize>,
    pending_bytes: Cell<usize>,
}

impl<'db> Txn<'db> {
    pub(crate) fn new(inner: Transaction<'db, OptimisticTransactionDB>, update: bool) -> Self {
        Self {
            inner,
            update,
            pending_ops: Cell::new(0),
            pending_bytes: Cell::new(0),
        }
    }

    fn reserve(&self, bytes: usize) -> Result<(), KvError> {
        if self.pending_ops.get() >= MAX_TXN_OPS
            || self.pending_bytes.get() + bytes > MAX_TXN_BYTES
        {
            return Err(KvError::TxnTooBig);
        }
        self.pending_ops.set(self.pending_ops.get() + 1);
        self.pending_bytes.set(self.pending_bytes.get() + bytes);
        Ok(())
    }

    /// Reads a key, returning the payload copy and its user-meta byte.
    ///
    /// Expired entries read as absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, u8)>, KvError> {
        let raw = if self.update {
            self.inner.get_for_update(key, true)?
        } else {
            self.inner.get(key)?
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        let (meta, expires_at, payload) = decode_value(&raw)?;
        if expires_at != 0 && expires_at <= unix_now_secs() {
            return Ok(None);
        }
        Ok(Some((payload.to_vec(), meta)))
    }

    /// Writes a payload under the envelope with the given meta and TTL.
    pub fn set_entry(
        &self,
        key: &[u8],
        payload: &[u8],
        meta: u8,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        self.reserve(key.len() + payload.len() + ENVELOPE_LEN)?;
        let expires_at = match ttl {
            Some(ttl) => unix_now_secs() + ttl.as_secs(),
            None => 0,
        };
        self.inner.put(key, encode_value(meta, expires_at, payload))?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        self.reserve(key.len())?;
        self.inner.delete(key)?;
        Ok(())
    }

    /// Key-ordered cursor over the transaction's view, expired entries
    /// skipped. Values are not prefetched beyond the cursor position.
    pub fn iter(&self) -> KvIter<'_, 'db> {
        KvIter {
            raw: self.inner.raw_iterator(),
            now_secs: unix_now_secs(),
            include_expired: false,
            err: None,
        }
    }

    /// Like [`Txn::iter`] but yields expired entries too. Used by the GC
    /// sweep, which exists to delete exactly those.
    pub(crate) fn iter_with_expired(&self) -> KvIter<'_, 'db> {
        KvIter {
            raw: self.inner.raw_iterator(),
            now_secs: unix_now_secs(),
            include_expired: true,
            err: None,
        }
    }

    pub(crate) fn commit(self) -> Result<(), KvError> {
        self.inner.commit().map_err(KvError::from)
    }
}

/// Cursor over envelope-decoded entries.
pub struct KvIter<'a, 'db> {
    raw: DBRawIteratorWithThreadMode<'a, Transaction<'db, OptimisticTransactionDB>>,
    now_secs: u64,
    include_expired: bool,
    err: Option<KvError>,
}

impl KvIter<'_, '_> {
    /// Positions the cursor on the next live entry. A malformed envelope
    /// stops iteration and is reported by `status`.
    fn settle(&mut self) {
        while self.raw.valid() {
            let Some(value) = self.raw.value() else {
                return;
            };
            if value.len() < ENVELOPE_LEN {
                self.err = Some(KvError::Corruption(format!(
                    "value shorter than envelope: {} bytes",
                    value.len()
                )));
                return;
            }
            if !self.include_expired {
                let expires_at = ByteReader::new(&value[1..ENVELOPE_LEN]).read_u64();
                if expires_at != 0 && expires_at <= self.now_secs {
                    self.raw.next();
                    continue;
                }
            }
            return;
        }
    }

    pub fn rewind(&mut self) {
        self.raw.seek_to_first();
        self.settle();
    }

    pub fn valid(&self) -> bool {
        self.err.is_none() && self.raw.valid()
    }

    pub fn next(&mut self) {
        self.raw.next();
        self.settle();
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.raw.key()
    }

    pub fn meta(&self) -> Option<u8> {
        self.raw.value().map(|v| v[0])
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.raw
            .value()
            .map(|v| ByteReader::new(&v[1..ENVELOPE_LEN]).read_u64())
    }

    /// The value payload behind the envelope, borrowed from the cursor.
    pub fn payload(&self) -> Option<&[u8]> {
        self.raw.value().map(|v| &v[ENVELOPE_LEN..])
    }

    /// Surfaces any iteration error once the cursor is exhausted.
    pub fn status(&mut self) -> Result<(), KvError> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        self.raw.status().map_err(KvError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let encoded = encode_value(3, 1_700_000_000, b"payload");
        let (meta, expires_at, payload) = decode_value(&encoded).unwrap();
        assert_eq!(meta, 3);
        assert_eq!(expires_at, 1_700_000_000);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_envelope_empty_payload() {
        let encoded = encode_value(1, 0, b"");
        let (meta, expires_at, payload) = decode_value(&encoded).unwrap();
        assert_eq!(meta, 1);
        assert_eq!(expires_at, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            decode_value(&[1, 2, 3]),
            Err(KvError::Corruption(_))
        ));
    }
}
