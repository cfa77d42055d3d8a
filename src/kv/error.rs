// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Substrate error types.

/// Errors surfaced by the KV substrate adapter.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Optimistic commit failed because a read key was concurrently written.
    /// The transaction must be retried from the top.
    #[error("transaction conflict, retry")]
    Conflict,

    /// The transaction's write budget is exhausted. Callers running a "big"
    /// transaction commit what is buffered and resume in a fresh one.
    #[error("transaction too big")]
    TxnTooBig,

    #[error("storage corruption: {0}")]
    Corruption(String),

    #[error("rocksdb error: {0}")]
    RocksDb(rocksdb::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for KvError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain => KvError::Conflict,
            _ => KvError::RocksDb(err),
        }
    }
}

/// Implemented by error types that can carry the substrate's transaction
/// control signals across module boundaries.
///
/// `big_update` and the purge retry loops need to recognize `TxnTooBig` and
/// `Conflict` inside wrapped error enums without downcasting.
pub trait TxnSignal {
    fn is_txn_too_big(&self) -> bool;
    fn is_conflict(&self) -> bool;
}

impl TxnSignal for KvError {
    fn is_txn_too_big(&self) -> bool {
        matches!(self, KvError::TxnTooBig)
    }

    fn is_conflict(&self) -> bool {
        matches!(self, KvError::Conflict)
    }
}
