// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Pooled raw-DEFLATE codecs.
//!
//! A compressor or decompressor carries tens of kilobytes of internal
//! state, so instances are pooled for the process lifetime: check one out,
//! reset it against fresh buffers, use it once, put it back.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::BlobError;

static COMPRESSORS: Lazy<Mutex<Vec<Compress>>> = Lazy::new(|| Mutex::new(Vec::new()));
static DECOMPRESSORS: Lazy<Mutex<Vec<Decompress>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, BlobError> {
    let mut codec = COMPRESSORS
        .lock()
        .pop()
        .unwrap_or_else(|| Compress::new(Compression::default(), false));
    codec.reset();

    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    loop {
        let consumed = codec.total_in() as usize;
        let status = codec.compress_vec(&data[consumed..], &mut out, FlushCompress::Finish)?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => out.reserve(out.len().max(512)),
        }
    }

    COMPRESSORS.lock().push(codec);
    Ok(out)
}

pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>, BlobError> {
    let mut codec = DECOMPRESSORS
        .lock()
        .pop()
        .unwrap_or_else(|| Decompress::new(false));
    codec.reset(false);

    let mut out = Vec::with_capacity(data.len() * 3 + 64);
    let status = loop {
        let consumed = codec.total_in() as usize;
        let status = codec.decompress_vec(&data[consumed..], &mut out, FlushDecompress::Finish);
        match status {
            Ok(Status::StreamEnd) => break Ok(()),
            Ok(Status::Ok) | Ok(Status::BufError) => {
                if codec.total_in() as usize == data.len() && out.len() < out.capacity() {
                    // Input exhausted without a stream end: truncated data.
                    break Err(BlobError::Kv(crate::kv::KvError::Corruption(
                        "truncated deflate stream".into(),
                    )));
                }
                out.reserve(out.len().max(512));
            }
            Err(err) => break Err(BlobError::from(err)),
        }
    };

    DECOMPRESSORS.lock().push(codec);
    status.map(|()| out)
}
