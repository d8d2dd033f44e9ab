// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Zstd Compressor Converter
//!
//! Wraps `zstd::bulk` as a [`Converter`] link. Storage bytes are the raw
//! zstd frame; `.cacnk` is the extension fragment this link contributes to
//! a chunk-file name.
//!
//! ## Round-trip safety guard
//!
//! `to_storage` immediately decompresses what it just produced and compares
//! against the input. Zstd frames are expected to decode deterministically,
//! but a single retry at a lower compression level is attempted before
//! giving up (`compress_chunk` followed by a checksum
//! recompute). What should trigger that fallback beyond a bitwise mismatch
//! is left open; see the design notes for this crate.

use casync_domain::CasyncError;
use casync_domain::Converter;

/// Ceiling on a single chunk's decompressed size, matching the chunker's
/// `max_size` upper bound so a corrupted or hostile frame
/// cannot force an unbounded allocation.
const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Converter for ZstdCompressor {
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let compressed = zstd::bulk::compress(data, self.level)
            .map_err(|e| CasyncError::internal(format!("zstd compression failed: {e}")))?;

        match zstd::bulk::decompress(&compressed, MAX_DECOMPRESSED_SIZE.max(data.len())) {
            Ok(roundtrip) if roundtrip == data => Ok(compressed),
            _ => {
                // Retry once at the fastest level before failing outright.
                let retry = zstd::bulk::compress(data, 1)
                    .map_err(|e| CasyncError::internal(format!("zstd retry compression failed: {e}")))?;
                let roundtrip = zstd::bulk::decompress(&retry, MAX_DECOMPRESSED_SIZE.max(data.len()))
                    .map_err(|e| CasyncError::internal(format!("zstd retry decompression failed: {e}")))?;
                if roundtrip == data {
                    Ok(retry)
                } else {
                    Err(CasyncError::internal("zstd round-trip verification failed after retry"))
                }
            }
        }
    }

    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        zstd::bulk::decompress(data, MAX_DECOMPRESSED_SIZE)
            .map_err(|e| CasyncError::internal(format!("zstd decompression failed: {e}")))
    }

    fn equal(&self, other: &dyn Converter) -> bool {
        other.extension() == self.extension()
    }

    fn extension(&self) -> String {
        ".cacnk".to_string()
    }
}
