// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! User-match index: bucketed per-user history plus the bucket catalog.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::codec::ByteReader;
use crate::kv::{spawn_gc_loop, KvError, KvStore, Txn, TxnSignal};

use super::record::{
    bucket_of_deadline_ms, bucket_of_id, encode_match, migrate_matches, read_match, read_matches,
    snowflake_ts_ms, UserMatch, MATCH_FORMAT_VERSION, MATCH_SIZE,
};
use super::versioned::{append_record, append_unique, remove_record, ValueDescriptor};
use super::IndexError;

/// Catalog keys are the bare user id; bucket keys append the bucket number.
/// The length difference is what tells them apart during purge iteration.
pub(crate) const KEY_LEN: usize = 4;
pub(crate) const BUCKET_LEN: usize = 4;

const BUCKET_FORMAT_VERSION: u8 = 1;

/// Catalog entries outlive their newest bucket by one full bucket span so a
/// bucket is never reachable without its catalog.
const CATALOG_TTL_SLACK: Duration = Duration::from_secs(10 * 86_400);

/// Soft cap on deletions per purge transaction. Crossing it forces a commit
/// so long purges keep their conflict window small.
const PURGE_SOFT_LIMIT: usize = 5_000;

const PURGE_MAX_RETRIES: u32 = 10;

fn user_key(user_id: u32) -> [u8; KEY_LEN] {
    user_id.to_be_bytes()
}

fn bucket_key(user_id: u32, bucket: u32) -> [u8; KEY_LEN + BUCKET_LEN] {
    let mut key = [0u8; KEY_LEN + BUCKET_LEN];
    key[..KEY_LEN].copy_from_slice(&user_id.to_be_bytes());
    key[KEY_LEN..].copy_from_slice(&bucket.to_be_bytes());
    key
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The persistent per-user match index.
pub struct UserStore {
    kv: Arc<KvStore>,
    retention: Duration,
    match_desc: ValueDescriptor,
    bucket_desc: ValueDescriptor,
}

impl UserStore {
    /// Opens the index at `path` with the given retention window.
    pub fn open(path: &Path, retention: Duration) -> Result<Self, IndexError> {
        let kv = Arc::new(KvStore::open(path)?);
        spawn_gc_loop(kv.clone(), "users").map_err(IndexError::from)?;
        Ok(Self {
            kv,
            retention,
            match_desc: ValueDescriptor {
                version: MATCH_FORMAT_VERSION,
                size: MATCH_SIZE,
                ttl: Some(retention),
                migrate: Some(migrate_matches),
            },
            bucket_desc: ValueDescriptor {
                version: BUCKET_FORMAT_VERSION,
                size: BUCKET_LEN,
                ttl: Some(retention + CATALOG_TTL_SLACK),
                migrate: None,
            },
        })
    }

    /// The oldest bucket still inside the retention window right now.
    fn retention_horizon(&self) -> u32 {
        let deadline_ms = unix_now_ms().saturating_sub(self.retention.as_millis() as u64);
        bucket_of_deadline_ms(deadline_ms)
    }

    /// Runs `f` inside one index transaction. Read-only transactions take
    /// snapshot reads without conflict tracking.
    pub fn transaction<R, E>(
        &self,
        update: bool,
        f: impl FnOnce(&UserTxn<'_, '_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<KvError>,
    {
        if update {
            self.kv.update(|txn| f(&UserTxn { txn, store: self }))
        } else {
            self.kv.view(|txn| f(&UserTxn { txn, store: self }))
        }
    }

    /// The `count` most recent matches, skipping the most recent `offset`,
    /// in chronological order.
    pub fn get_last_user_matches(
        &self,
        user_id: u32,
        offset: usize,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        self.transaction(false, |txn| txn.get_last_user_matches(user_id, offset, count))
    }

    /// Up to `count` matches with id strictly greater than `begin`, ascending.
    pub fn get_user_matches_after(
        &self,
        user_id: u32,
        begin: u64,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        self.transaction(false, |txn| txn.get_user_matches_after(user_id, begin, count))
    }

    /// Up to `count` matches with id strictly less than `begin`, ascending.
    pub fn get_user_matches_before(
        &self,
        user_id: u32,
        begin: u64,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        self.transaction(false, |txn| txn.get_user_matches_before(user_id, begin, count))
    }

    /// Deletes all match state older than `deadline`.
    ///
    /// Runs as a chain of "big" transactions: overruns commit what is done
    /// and resume from the top; conflicts retry the pass. Returns the number
    /// of buckets deleted or trimmed.
    pub fn purge(&self, deadline: SystemTime) -> Result<usize, IndexError> {
        let deadline_ms = deadline
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            * 1000;
        let horizon = bucket_of_deadline_ms(deadline_ms);

        let mut deleted = 0usize;
        let mut retry = 0u32;
        loop {
            let mut deleted_now = 0usize;
            let outcome = self
                .kv
                .big_update(|txn| self.purge_pass(txn, deadline_ms, horizon, &mut deleted_now));
            match outcome {
                Ok(overrun) => {
                    deleted += deleted_now;
                    if overrun {
                        info!(deleted, "user purge transaction full, resuming");
                        retry = 0;
                        continue;
                    }
                    return Ok(deleted);
                }
                Err(err) if err.is_conflict() => {
                    retry += 1;
                    if retry > PURGE_MAX_RETRIES {
                        return Err(IndexError::TooManyConflicts);
                    }
                    warn!(retry, "user purge conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One purge transaction: sweep expired buckets up to the soft limit.
    fn purge_pass(
        &self,
        txn: &Txn<'_>,
        deadline_ms: u64,
        horizon: u32,
        deleted_now: &mut usize,
    ) -> Result<(), IndexError> {
        // Collect candidate bucket keys first, values untouched; mutation
        // follows in key order, which is users-then-buckets ascending.
        let mut candidates: Vec<(Vec<u8>, u32)> = Vec::new();
        {
            let mut it = txn.iter();
            it.rewind();
            while it.valid() {
                if let Some(key) = it.key() {
                    if key.len() == KEY_LEN + BUCKET_LEN {
                        let bucket = ByteReader::new(&key[KEY_LEN..]).read_u32();
                        if bucket <= horizon {
                            candidates.push((key.to_vec(), bucket));
                        }
                    }
                }
                it.next();
            }
            it.status().map_err(IndexError::from)?;
        }

        for (key, bucket) in candidates {
            if bucket < horizon {
                // Catalog membership goes first. If the transaction dies
                // between the two deletes, the worst case is a dangling
                // bucket the next pass sweeps again; the other order leaks
                // a catalog entry forever.
                remove_record(txn, &key[..KEY_LEN], &key[KEY_LEN..], false, &self.bucket_desc)?;
                txn.delete(&key).map_err(IndexError::from)?;
                *deleted_now += 1;
            } else {
                // Frontier bucket: trim records up to the first one at or
                // past the deadline. `ts == deadline` counts as live.
                let Some((value, version)) = txn.get(&key).map_err(IndexError::from)? else {
                    continue;
                };
                let mut reader = ByteReader::new(&value);
                let mut survivor_at = 0usize;
                while reader.remaining() >= MATCH_SIZE {
                    let mark = reader.position();
                    let record = read_match(version, &mut reader)?;
                    if snowflake_ts_ms(record.id) >= deadline_ms {
                        survivor_at = mark;
                        break;
                    }
                    survivor_at = reader.position();
                }
                if survivor_at == 0 {
                    continue;
                }
                if survivor_at >= value.len() {
                    remove_record(txn, &key[..KEY_LEN], &key[KEY_LEN..], false, &self.bucket_desc)?;
                    txn.delete(&key).map_err(IndexError::from)?;
                } else {
                    // Rewrite the surviving tail under the version it was
                    // stored with; migration stays a write-path concern.
                    txn.set_entry(&key, &value[survivor_at..], version, None)
                        .map_err(IndexError::from)?;
                }
                *deleted_now += 1;
            }
            if *deleted_now > PURGE_SOFT_LIMIT {
                // Force a commit boundary to keep conflict odds low.
                return Err(IndexError::Kv(KvError::TxnTooBig));
            }
        }
        Ok(())
    }

    pub fn flatten(&self) -> Result<(), IndexError> {
        self.kv.flatten().map_err(IndexError::from)
    }

    pub fn backup(&self) -> Result<std::path::PathBuf, IndexError> {
        self.kv.backup().map_err(IndexError::from)
    }
}

/// One transaction over the user index.
pub struct UserTxn<'a, 'db> {
    txn: &'a Txn<'db>,
    store: &'a UserStore,
}

impl UserTxn<'_, '_> {
    /// Records that `user_id` took part in `match_id` with the given state
    /// byte: the bucket number joins the catalog (dropping catalog entries
    /// below the retention horizon on the way), the record joins the bucket.
    pub fn add_match(&self, user_id: u32, match_id: u64, state: u8) -> Result<(), IndexError> {
        let bucket = bucket_of_id(match_id);
        let horizon = self.store.retention_horizon();
        let filter = move |value: Vec<u8>| drop_buckets_below(value, horizon);

        append_unique(
            self.txn,
            &user_key(user_id),
            &bucket.to_be_bytes(),
            Some(&filter),
            &self.store.bucket_desc,
        )?;
        append_record(
            self.txn,
            &bucket_key(user_id, bucket),
            &encode_match(match_id, state),
            &self.store.match_desc,
        )
    }

    /// The user's bucket numbers, oldest first. Missing catalog reads empty.
    fn get_buckets(&self, user_id: u32) -> Result<Vec<u32>, IndexError> {
        let Some((value, _)) = self.txn.get(&user_key(user_id))? else {
            return Ok(Vec::new());
        };
        let mut reader = ByteReader::new(&value);
        let mut buckets = Vec::with_capacity(value.len() / BUCKET_LEN);
        while reader.remaining() >= BUCKET_LEN {
            buckets.push(reader.read_u32());
        }
        Ok(buckets)
    }

    /// See [`UserStore::get_last_user_matches`].
    ///
    /// The offset and count are applied to the raw value bytes before any
    /// decoding, so at most one partial bucket is ever decoded.
    pub fn get_last_user_matches(
        &self,
        user_id: u32,
        offset: usize,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        let buckets = self.get_buckets(user_id)?;
        let horizon = self.store.retention_horizon();

        let mut matches: Vec<UserMatch> = Vec::new();
        let mut offset_bytes = offset.saturating_mul(MATCH_SIZE);
        let mut remaining_bytes = count.saturating_mul(MATCH_SIZE);

        for &bucket in buckets.iter().rev() {
            if bucket < horizon {
                // Catalog is ordered, nothing older can qualify.
                break;
            }
            let Some((value, version)) = self.txn.get(&bucket_key(user_id, bucket))? else {
                continue;
            };
            let mut window: &[u8] = &value;

            // Skip offset records without decoding them.
            if offset_bytes > 0 {
                if window.len() <= offset_bytes {
                    offset_bytes -= window.len();
                    continue;
                }
                window = &window[..window.len() - offset_bytes];
                offset_bytes = 0;
            }

            // Cap to what is still needed before decoding.
            if window.len() > remaining_bytes {
                window = &window[window.len() - remaining_bytes..];
            } else {
                remaining_bytes -= window.len();
            }

            let mut chunk = read_matches(version, window)?;
            chunk.extend(matches);
            matches = chunk;
            if matches.len() >= count {
                break;
            }
        }
        Ok(matches)
    }

    /// See [`UserStore::get_user_matches_after`].
    pub fn get_user_matches_after(
        &self,
        user_id: u32,
        begin: u64,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        let buckets = self.get_buckets(user_id)?;
        let skip_below = bucket_of_id(begin).max(self.store.retention_horizon());

        let mut matches: Vec<UserMatch> = Vec::new();
        for &bucket in &buckets {
            if bucket < skip_below {
                continue;
            }
            let Some((value, version)) = self.txn.get(&bucket_key(user_id, bucket))? else {
                continue;
            };

            let idx_from = search_records(&value, |id| id > begin);
            let records = value.len() / MATCH_SIZE;
            let idx_to = records.min(idx_from.saturating_add(count - matches.len()));
            if idx_to == idx_from {
                continue;
            }

            let chunk = read_matches(version, &value[idx_from * MATCH_SIZE..idx_to * MATCH_SIZE])?;
            matches.extend(chunk);
            if matches.len() >= count {
                break;
            }
        }
        Ok(matches)
    }

    /// See [`UserStore::get_user_matches_before`].
    pub fn get_user_matches_before(
        &self,
        user_id: u32,
        begin: u64,
        count: usize,
    ) -> Result<Vec<UserMatch>, IndexError> {
        let buckets = self.get_buckets(user_id)?;
        let from_bucket = bucket_of_id(begin);
        let horizon = self.store.retention_horizon();

        let mut matches: Vec<UserMatch> = Vec::new();
        for &bucket in buckets.iter().rev() {
            if bucket > from_bucket {
                continue;
            }
            if bucket < horizon {
                break;
            }
            let Some((value, version)) = self.txn.get(&bucket_key(user_id, bucket))? else {
                continue;
            };

            let idx_to = search_records(&value, |id| id >= begin);
            if idx_to == 0 {
                continue;
            }
            let idx_from = idx_to.saturating_sub(count - matches.len());

            let mut chunk =
                read_matches(version, &value[idx_from * MATCH_SIZE..idx_to * MATCH_SIZE])?;
            chunk.extend(matches);
            matches = chunk;
            if matches.len() >= count {
                break;
            }
        }
        Ok(matches)
    }
}

/// Returns the catalog suffix starting at the first bucket at or past the
/// horizon. Buckets only grow, so everything before it is expired.
fn drop_buckets_below(value: Vec<u8>, horizon: u32) -> Vec<u8> {
    let mut start = 0;
    for window in value.chunks_exact(BUCKET_LEN) {
        if u32::from_be_bytes([window[0], window[1], window[2], window[3]]) >= horizon {
            break;
        }
        start += BUCKET_LEN;
    }
    if start == 0 {
        value
    } else {
        value[start..].to_vec()
    }
}

/// First record index for which `pred(id)` holds; records ascend by id.
fn search_records(value: &[u8], pred: impl Fn(u64) -> bool) -> usize {
    let mut lo = 0;
    let mut hi = value.len() / MATCH_SIZE;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let id = ByteReader::new(&value[mid * MATCH_SIZE..]).read_u64();
        if pred(id) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}
