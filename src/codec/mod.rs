// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Fixed big-endian byte codec.
//!
//! Stored values in the index are packed arrays of fixed-size records, so
//! everything here works in terms of explicit cursors over flat byte
//! buffers rather than a self-describing format. All integers are
//! big-endian: that makes `u32`/`u64` keys sort correctly under the
//! substrate's byte-lexicographic comparator.

mod buf;

pub use buf::{ByteBuf, ByteReader};
