// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Cursor-based byte buffers.

/// An owned byte buffer with independent writer and reader cursors.
///
/// Two modes:
/// - `fixed`: the buffer is pre-sized and writes overwrite in place; a write
///   past the end is a bug in the caller and panics.
/// - `grow`: writes append and extend the buffer.
///
/// Readers consume from the front; `remaining() == 0` after a record-wise
/// pass is the end-of-value signal the index relies on.
#[derive(Debug)]
pub struct ByteBuf {
    buf: Vec<u8>,
    writer: usize,
    reader: usize,
    grow: bool,
}

impl ByteBuf {
    /// Creates a fixed-capacity buffer of `len` zero bytes.
    pub fn fixed(len: usize) -> Self {
        Self {
            buf: vec![0; len],
            writer: 0,
            reader: 0,
            grow: false,
        }
    }

    /// Creates an empty growable buffer.
    pub fn grow() -> Self {
        Self {
            buf: Vec::new(),
            writer: 0,
            reader: 0,
            grow: true,
        }
    }

    /// Wraps an existing buffer for reading (fixed mode, cursors at zero).
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self {
            buf,
            writer: 0,
            reader: 0,
            grow: false,
        }
    }

    /// Writes `p` at the writer cursor, overwriting in fixed mode and
    /// appending in grow mode.
    pub fn write(&mut self, p: &[u8]) {
        if self.grow && self.writer + p.len() > self.buf.len() {
            self.buf.resize(self.writer + p.len(), 0);
        }
        self.buf[self.writer..self.writer + p.len()].copy_from_slice(p);
        self.writer += p.len();
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) {
        self.write(&[v]);
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_be_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_be_bytes());
    }

    /// Reads `n` bytes at the reader cursor, returning the borrowed window.
    pub fn read(&mut self, n: usize) -> &[u8] {
        let slice = &self.buf[self.reader..self.reader + n];
        self.reader += n;
        slice
    }

    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.read(1)[0]
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        let s = self.read(4);
        u32::from_be_bytes([s[0], s[1], s[2], s[3]])
    }

    #[inline]
    pub fn read_u64(&mut self) -> u64 {
        let s = self.read(8);
        u64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
    }

    /// Bytes left between the reader cursor and the end of the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.reader
    }

    /// Current reader position.
    #[inline]
    pub fn position(&self) -> usize {
        self.reader
    }

    /// Consumes the buffer, returning the underlying bytes.
    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// A read-only cursor over a borrowed byte slice.
///
/// Used where the value bytes are already owned elsewhere (a transaction
/// read) and the caller only needs to walk records without copying.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads `n` bytes, returning a window borrowed from the source slice.
    pub fn read(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.read(1)[0]
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        let s = self.read(4);
        u32::from_be_bytes([s[0], s[1], s[2], s[3]])
    }

    #[inline]
    pub fn read_u64(&mut self) -> u64 {
        let s = self.read(8);
        u64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_write_read() {
        let mut buf = ByteBuf::fixed(13);
        buf.write_u64(0xDEAD_BEEF_0000_0001);
        buf.write_u32(42);
        buf.write_u8(7);

        assert_eq!(buf.read_u64(), 0xDEAD_BEEF_0000_0001);
        assert_eq!(buf.read_u32(), 42);
        assert_eq!(buf.read_u8(), 7);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_grow_extends() {
        let mut buf = ByteBuf::grow();
        buf.write(b"hello");
        buf.write(b" world");
        assert_eq!(buf.as_slice(), b"hello world");
    }

    #[test]
    fn test_fixed_overwrites() {
        let mut buf = ByteBuf::from_vec(vec![0xFF; 4]);
        buf.write_u32(1);
        assert_eq!(buf.into_vec(), vec![0, 0, 0, 1]);
    }

    #[test]
    #[should_panic]
    fn test_fixed_write_past_end_panics() {
        let mut buf = ByteBuf::fixed(2);
        buf.write_u32(1);
    }

    #[test]
    fn test_reader_windows() {
        let data = [0u8, 0, 0, 0, 0, 0x40, 0, 1, 1];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u64(), 0x0040_0001);
        assert_eq!(r.read_u8(), 1);
        assert_eq!(r.remaining(), 0);
        assert_eq!(r.position(), 9);
    }

    #[test]
    fn test_reader_partial_position() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut r = ByteReader::new(&data);
        r.read(2);
        assert_eq!(r.position(), 2);
        assert_eq!(r.remaining(), 4);
        assert_eq!(r.read(4), &[3, 4, 5, 6]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn u64_roundtrip(v in any::<u64>()) {
            let mut buf = ByteBuf::fixed(8);
            buf.write_u64(v);
            prop_assert_eq!(buf.read_u64(), v);
        }

        #[test]
        fn grow_matches_concat(chunks in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..32), 0..8)
        ) {
            let mut buf = ByteBuf::grow();
            let mut expected = Vec::new();
            for chunk in &chunks {
                buf.write(chunk);
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(buf.as_slice(), expected.as_slice());
        }

        #[test]
        fn be_ordering_matches_numeric(a in any::<u32>(), b in any::<u32>()) {
            // Catalog keys rely on BE encodings sorting like the integers.
            prop_assert_eq!(a.cmp(&b), a.to_be_bytes().cmp(&b.to_be_bytes()));
        }
    }
}
