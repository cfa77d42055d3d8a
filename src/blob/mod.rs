// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Match blob store.
//!
//! A single key space mapping the 8-byte big-endian match id to its JSON
//! document, compressed with raw DEFLATE once it crosses a size threshold.
//! The entry's user-meta byte records the encoding so reads can dispatch
//! without sniffing.

mod flate;
mod store;

pub use store::MatchStore;

use crate::kv::{KvError, TxnSignal};

/// Errors surfaced by the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("compression error: {0}")]
    Compress(#[from] flate2::CompressError),

    #[error("decompression error: {0}")]
    Decompress(#[from] flate2::DecompressError),

    /// A stored blob carries an encoding byte this build does not know.
    #[error("unknown blob encoding {meta}")]
    UnknownEncoding { meta: u8 },

    #[error("purge aborted: too many conflicts")]
    TooManyConflicts,
}

impl TxnSignal for BlobError {
    fn is_txn_too_big(&self) -> bool {
        matches!(self, BlobError::Kv(err) if err.is_txn_too_big())
    }

    fn is_conflict(&self) -> bool {
        matches!(self, BlobError::Kv(err) if err.is_conflict())
    }
}
