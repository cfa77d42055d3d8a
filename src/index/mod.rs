// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-user match index.
//!
//! Two key families share one store. The catalog key is the bare 4-byte
//! user id and its value lists the user's bucket numbers; a bucket key is
//! `user_id ‖ bucket_num` (8 bytes) and its value is the packed array of
//! 9-byte match records for that ten-day window. Key length alone tells the
//! two apart, which the purge iteration relies on.
//!
//! Invariants after every committed transaction:
//! - every existing bucket key is listed in its user's catalog;
//! - bucket values are a multiple of 9 bytes, catalogs a multiple of 4;
//! - records in a bucket and bucket numbers in a catalog ascend.

mod record;
mod users;
mod versioned;

pub use record::{
    bucket_of_deadline_ms, bucket_of_id, encode_match, snowflake_ts_ms, UserMatch,
    MATCH_SIZE, SNOWFLAKE_EPOCH_MS, STATE_DRAW, STATE_LOSS, STATE_WIN,
};
pub use users::{UserStore, UserTxn};
pub use versioned::{append_record, append_unique, remove_record, ValueDescriptor};

use crate::kv::{KvError, TxnSignal};

/// Errors surfaced by the user index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Kv(#[from] KvError),

    /// A stored value carries a format version no migrator recognizes.
    #[error("unsupported record version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("purge aborted: too many conflicts")]
    TooManyConflicts,
}

impl TxnSignal for IndexError {
    fn is_txn_too_big(&self) -> bool {
        matches!(self, IndexError::Kv(err) if err.is_txn_too_big())
    }

    fn is_conflict(&self) -> bool {
        matches!(self, IndexError::Kv(err) if err.is_conflict())
    }
}
