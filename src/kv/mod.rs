// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! KV substrate adapter.
//!
//! The index and blob store only assume an ordered key-value store with
//! optimistic transactions, a per-entry user-meta byte and optional TTL.
//! This module supplies that contract on top of RocksDB's optimistic
//! transaction support:
//!
//! - values carry a 9-byte envelope `[meta][expires_at u64 BE]`, so TTL and
//!   user-meta live with the entry and expired entries read as absent;
//! - commit conflicts surface as [`KvError::Conflict`] and must be retried
//!   by the caller;
//! - every transaction has a write budget; exhausting it yields
//!   [`KvError::TxnTooBig`], which [`KvStore::big_update`] turns into a
//!   commit-and-resume boundary;
//! - a background sweep physically deletes expired entries.

mod error;
mod store;
mod txn;

pub use error::{KvError, TxnSignal};
pub use store::{spawn_gc_loop, KvStore};
pub use txn::{KvIter, Txn};
