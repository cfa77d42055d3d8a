// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Blob store over the KV substrate.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::codec::ByteReader;
use crate::index::snowflake_ts_ms;
use crate::kv::{spawn_gc_loop, KvStore, TxnSignal};

use super::flate::{deflate, inflate};
use super::BlobError;

const META_RAW: u8 = 0;
const META_FLATE: u8 = 1;

/// Expired blobs are collected in slices this big per purge transaction so
/// one pass never outgrows the write budget.
const PURGE_CHUNK: usize = 50_000;

const PURGE_MAX_RETRIES: u32 = 10;

/// Match-id → JSON document store with transparent compression.
pub struct MatchStore {
    kv: Arc<KvStore>,
    compress_threshold: usize,
    ttl: Option<Duration>,
}

impl MatchStore {
    /// Opens the blob store. Documents larger than `compress_threshold`
    /// bytes are stored DEFLATE-compressed.
    pub fn open(
        path: &Path,
        compress_threshold: usize,
        ttl: Option<Duration>,
    ) -> Result<Self, BlobError> {
        let kv = Arc::new(KvStore::open(path)?);
        spawn_gc_loop(kv.clone(), "matches").map_err(BlobError::from)?;
        Ok(Self {
            kv,
            compress_threshold,
            ttl,
        })
    }

    /// Stores the document for `id`.
    ///
    /// Borrowed input is copied before the write buffers it (the caller's
    /// buffer may back an in-flight request body); owned input is moved.
    pub fn put(&self, id: u64, data: Cow<'_, [u8]>) -> Result<(), BlobError> {
        self.kv.update(move |txn| {
            if data.len() > self.compress_threshold {
                let compressed = deflate(&data)?;
                txn.set_entry(&id.to_be_bytes(), &compressed, META_FLATE, self.ttl)
                    .map_err(BlobError::from)
            } else {
                let owned = data.into_owned();
                txn.set_entry(&id.to_be_bytes(), &owned, META_RAW, self.ttl)
                    .map_err(BlobError::from)
            }
        })
    }

    /// Fetches the document for `id`, decompressing when needed.
    pub fn get(&self, id: u64) -> Result<Option<Vec<u8>>, BlobError> {
        let Some((payload, meta)) = self.kv.view(|txn| txn.get(&id.to_be_bytes()))? else {
            return Ok(None);
        };
        match meta {
            META_RAW => Ok(Some(payload)),
            META_FLATE => Ok(Some(inflate(&payload)?)),
            meta => Err(BlobError::UnknownEncoding { meta }),
        }
    }

    /// Deletes every blob whose snowflake timestamp is before `deadline`.
    ///
    /// Ids ascend with time under the big-endian key order, so each pass
    /// walks from the front and stops at the first live blob. Returns the
    /// number of blobs deleted.
    pub fn purge(&self, deadline: SystemTime) -> Result<usize, BlobError> {
        let deadline_ms = deadline
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            * 1000;

        let mut deleted = 0usize;
        let mut retry = 0u32;
        loop {
            let mut deleted_now = 0usize;
            let outcome = self
                .kv
                .big_update(|txn| -> Result<(), BlobError> {
                    let mut expired: Vec<Vec<u8>> = Vec::new();
                    let mut it = txn.iter();
                    it.rewind();
                    while it.valid() && expired.len() < PURGE_CHUNK {
                        let Some(key) = it.key() else { break };
                        if key.len() == 8 {
                            let id = ByteReader::new(key).read_u64();
                            if snowflake_ts_ms(id) >= deadline_ms {
                                break;
                            }
                            expired.push(key.to_vec());
                        }
                        it.next();
                    }
                    it.status().map_err(BlobError::from)?;

                    let full_chunk = expired.len() == PURGE_CHUNK;
                    for key in expired {
                        txn.delete(&key).map_err(BlobError::from)?;
                        deleted_now += 1;
                    }
                    if full_chunk {
                        // More expired blobs follow; commit and resume.
                        return Err(BlobError::Kv(crate::kv::KvError::TxnTooBig));
                    }
                    Ok(())
                });
            match outcome {
                Ok(overrun) => {
                    deleted += deleted_now;
                    if overrun {
                        info!(deleted, "blob purge transaction full, resuming");
                        retry = 0;
                        continue;
                    }
                    return Ok(deleted);
                }
                Err(err) if err.is_conflict() => {
                    retry += 1;
                    if retry > PURGE_MAX_RETRIES {
                        return Err(BlobError::TooManyConflicts);
                    }
                    warn!(retry, "blob purge conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn flatten(&self) -> Result<(), BlobError> {
        self.kv.flatten().map_err(BlobError::from)
    }

    pub fn backup(&self) -> Result<std::path::PathBuf, BlobError> {
        self.kv.backup().map_err(BlobError::from)
    }
}
