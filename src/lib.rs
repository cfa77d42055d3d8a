// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! ArenaDB: an embedded match-history database with per-user chronological indexes
//!
//! This crate answers "which matches did user U play, in what order, and
//! with what outcome?". A write path ingests finished match documents; the
//! read path serves cursor-paginated per-user listings; retention is
//! enforced by a deadline purge plus entry-level TTLs.
//!
//! The layers, leaves first: an ordered KV substrate with optimistic
//! transactions ([`kv`]), big-endian cursor buffers ([`codec`]), the
//! versioned per-user match index ([`index`]), the compressed match blob
//! store ([`blob`]), and the HTTP surface ([`api`]).

pub mod api;
pub mod blob;
pub mod codec;
pub mod config;
pub mod index;
pub mod kv;

pub use blob::{BlobError, MatchStore};
pub use config::Config;
pub use index::{IndexError, UserMatch, UserStore};
pub use kv::{KvError, KvStore};
