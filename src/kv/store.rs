// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RocksDB-backed substrate store.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rocksdb::{OptimisticTransactionDB, OptimisticTransactionOptions, Options, WriteOptions};
use tracing::{debug, info, warn};

use crate::codec::ByteBuf;

use super::txn::unix_now_secs;
use super::{KvError, Txn, TxnSignal};

/// How many expired entries one GC sweep deletes at most; the sweep is
/// re-run by the background loop until it reports nothing reclaimed.
const GC_BATCH: usize = 4096;

const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// An embedded ordered key-value store with optimistic transactions,
/// per-entry user-meta and TTL.
///
/// Keys are byte-lexicographic. Commits of update transactions validate the
/// read set and fail with [`KvError::Conflict`] on concurrent writes.
pub struct KvStore {
    db: OptimisticTransactionDB,
    path: PathBuf,
}

impl KvStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Tuned for many small values and frequent full scans
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_target_file_size_base(64 * 1024 * 1024);
        opts.set_level_compaction_dynamic_level_bytes(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);

        // Bloom filters for point lookups
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        let db = OptimisticTransactionDB::open(&opts, path).map_err(KvError::from)?;
        info!(path = %path.display(), "opened kv store");

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    fn begin(&self, update: bool) -> Txn<'_> {
        let mut topts = OptimisticTransactionOptions::default();
        topts.set_snapshot(true);
        let inner = self.db.transaction_opt(&WriteOptions::default(), &topts);
        Txn::new(inner, update)
    }

    /// Runs `f` in a read-only transaction. Nothing is committed.
    pub fn view<R, E>(&self, f: impl FnOnce(&Txn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<KvError>,
    {
        let txn = self.begin(false);
        f(&txn)
    }

    /// Runs `f` in an update transaction and commits. Any error from `f`
    /// discards the transaction.
    pub fn update<R, E>(&self, f: impl FnOnce(&Txn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<KvError>,
    {
        let txn = self.begin(true);
        let result = f(&txn)?;
        txn.commit().map_err(E::from)?;
        Ok(result)
    }

    /// Runs `f` in an update transaction that treats `TxnTooBig` as a commit
    /// boundary rather than a failure: what is buffered is committed and
    /// `overrun = true` is returned so the caller can resume in a fresh
    /// transaction.
    pub fn big_update<E>(&self, f: impl FnOnce(&Txn) -> Result<(), E>) -> Result<bool, E>
    where
        E: From<KvError> + TxnSignal,
    {
        let txn = self.begin(true);
        match f(&txn) {
            Ok(()) => {
                txn.commit().map_err(E::from)?;
                Ok(false)
            }
            Err(err) if err.is_txn_too_big() => {
                txn.commit().map_err(E::from)?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Compacts the whole key range down to the bottom level.
    pub fn flatten(&self) -> Result<(), KvError> {
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    /// Dumps a snapshot of all live entries to `w` in a framed format:
    /// `[key_len u32][key][meta u8][expires u64][val_len u32][val]`.
    /// Returns the number of entries written.
    pub fn backup_to<W: Write>(&self, w: &mut W) -> Result<u64, KvError> {
        self.view(|txn| {
            let mut written = 0u64;
            let mut it = txn.iter();
            it.rewind();
            while it.valid() {
                let (Some(key), Some(meta), Some(expires_at), Some(payload)) =
                    (it.key(), it.meta(), it.expires_at(), it.payload())
                else {
                    break;
                };
                let mut frame = ByteBuf::grow();
                frame.write_u32(key.len() as u32);
                frame.write(key);
                frame.write_u8(meta);
                frame.write_u64(expires_at);
                frame.write_u32(payload.len() as u32);
                frame.write(payload);
                w.write_all(frame.as_slice())?;
                written += 1;
                it.next();
            }
            it.status()?;
            w.flush()?;
            Ok(written)
        })
    }

    /// Writes a backup file `<db_dir>/backups/backup<unix_ts>.bak` and
    /// returns its path.
    pub fn backup(&self) -> Result<PathBuf, KvError> {
        let dir = self.path.join("backups");
        std::fs::create_dir_all(&dir)?;
        let name = dir.join(format!("backup{}.bak", unix_now_secs()));
        let mut file = BufWriter::new(File::create(&name)?);
        let entries = self.backup_to(&mut file)?;
        info!(path = %name.display(), entries, "backup written");
        Ok(name)
    }

    /// Deletes up to [`GC_BATCH`] physically-expired entries and returns how
    /// many were reclaimed. Zero means there is currently nothing to do.
    pub fn gc_expired(&self) -> Result<usize, KvError> {
        let now = unix_now_secs();
        let expired: Vec<Vec<u8>> = self.view(|txn| {
            let mut keys = Vec::new();
            let mut it = txn.iter_with_expired();
            it.rewind();
            while it.valid() && keys.len() < GC_BATCH {
                if let (Some(key), Some(expires_at)) = (it.key(), it.expires_at()) {
                    if expires_at != 0 && expires_at <= now {
                        keys.push(key.to_vec());
                    }
                }
                it.next();
            }
            it.status()?;
            Ok::<_, KvError>(keys)
        })?;

        if expired.is_empty() {
            return Ok(0);
        }
        let reclaimed = expired.len();
        self.update(|txn| {
            for key in &expired {
                txn.delete(key)?;
            }
            Ok::<_, KvError>(())
        })?;
        debug!(reclaimed, "gc sweep");
        Ok(reclaimed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Spawns the background GC thread: sweep until nothing is reclaimed, then
/// sleep five minutes.
pub fn spawn_gc_loop(store: Arc<KvStore>, name: &str) -> Result<(), KvError> {
    let thread_name = format!("kv-gc-{name}");
    let label = name.to_string();
    std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || loop {
            loop {
                match store.gc_expired() {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(store = %label, error = %err, "gc sweep failed");
                        break;
                    }
                }
            }
            std::thread::sleep(GC_INTERVAL);
        })?;
    Ok(())
}
