// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Content-Defined Chunker
//!
//! [`Chunker`] implements the rolling-hash content-defined chunker: a
//! Buzhash-style hash over a sliding window, a chunk boundary declared when
//! `hash mod avg == avg - 1`, forced at `max` if no boundary is found, with
//! the final chunk emitted short on end-of-input. It is a pull-style
//! iterator over a blocking [`Read`] so it can run on a worker thread via
//! [`AsyncChunker`], keeping the sync core separate from its async adapter
//! (see `casync_domain::services::converter` for the rationale repeated in
//! this crate).

use casync_domain::{CasyncError, ChunkId, ChunkerParams};
use std::io::Read;
use tokio::sync::mpsc;

/// Width in bytes of the buzhash sliding window.
const WINDOW_SIZE: usize = 48;

const fn splitmix64(seed: u64) -> (u64, u64) {
    let seed = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = seed;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    (z ^ (z >> 31), seed)
}

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    // Fixed seed: the table must be identical across runs and platforms
    // so it cannot be
    // derived from OS randomness.
    let mut state = 0xCA57_9C00_u64;
    let mut i = 0;
    while i < 256 {
        let (value, next_state) = splitmix64(state);
        table[i] = value;
        state = next_state;
        i += 1;
    }
    table
}

static BUZHASH_TABLE: [u64; 256] = build_table();

/// One chunk emitted by the chunker: its offset within the source, its
/// bytes, and the content id of those bytes.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub start: u64,
    pub data: Vec<u8>,
    pub id: ChunkId,
}

impl ChunkRecord {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Pull-style content-defined chunker over a blocking [`Read`].
///
/// Call [`Chunker::next_chunk`] repeatedly until it returns `Ok(None)`.
/// Buffers at most `max_size` bytes of read-ahead at a time, so total work
/// is O(input length) regardless of how many chunks are produced.
pub struct Chunker<R> {
    source: R,
    params: ChunkerParams,
    buf: Vec<u8>,
    offset: u64,
    eof: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(source: R, params: ChunkerParams) -> Self {
        Self {
            source,
            params,
            buf: Vec::new(),
            offset: 0,
            eof: false,
        }
    }

    pub fn with_defaults(source: R) -> Self {
        Self::new(source, ChunkerParams::default())
    }

    pub fn params(&self) -> ChunkerParams {
        self.params
    }

    fn fill_to(&mut self, target: usize) -> std::io::Result<()> {
        let mut tmp = [0u8; 64 * 1024];
        while self.buf.len() < target && !self.eof {
            let n = self.source.read(&mut tmp)?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
        Ok(())
    }

    /// Produces the next chunk, or `None` once the source is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkRecord>, CasyncError> {
        let min = self.params.min_size as usize;
        let max = self.params.max_size as usize;

        self.fill_to(max)?;
        if self.buf.is_empty() {
            return Ok(None);
        }

        let available = self.buf.len();
        let scan_limit = available.min(max);
        let mut boundary = None;

        if scan_limit > min {
            let mut hash: u64 = 0;
            for i in 0..scan_limit {
                let incoming = self.buf[i];
                hash = hash.rotate_left(1) ^ BUZHASH_TABLE[incoming as usize];
                if i >= WINDOW_SIZE {
                    let outgoing = self.buf[i - WINDOW_SIZE];
                    hash ^= BUZHASH_TABLE[outgoing as usize].rotate_left(WINDOW_SIZE as u32);
                }
                let candidate_size = i + 1;
                if candidate_size >= min && candidate_size < max && hash % self.params.avg_size == self.params.avg_size - 1 {
                    boundary = Some(candidate_size);
                    break;
                }
            }
        }

        let size = match boundary {
            Some(b) => b,
            None if available >= max => max,
            None => available,
        };

        let data: Vec<u8> = self.buf.drain(..size).collect();
        let start = self.offset;
        self.offset += size as u64;
        let id = ChunkId::compute(&data);
        Ok(Some(ChunkRecord { start, data, id }))
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = Result<ChunkRecord, CasyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Runs a blocking [`Chunker`] on a `spawn_blocking` task and streams its
/// output through a bounded channel, so async callers (the chunk-storage
/// pipeline) never block the runtime on chunker I/O.
pub struct AsyncChunker;

impl AsyncChunker {
    /// Spawns the chunker and returns the receiving half of the channel it
    /// feeds. The channel carries `channel_depth` chunks of read-ahead.
    pub fn spawn<R>(source: R, params: ChunkerParams, channel_depth: usize) -> mpsc::Receiver<Result<ChunkRecord, CasyncError>>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(channel_depth.max(1));
        tokio::task::spawn_blocking(move || {
            let mut chunker = Chunker::new(source, params);
            loop {
                let item = chunker.next_chunk();
                let is_end = matches!(item, Ok(None));
                let is_err = item.is_err();
                if let Ok(Some(record)) = item {
                    if tx.blocking_send(Ok(record)).is_err() {
                        return;
                    }
                } else if is_err {
                    let _ = tx.blocking_send(item.map(|_| unreachable!()));
                }
                if is_end || is_err {
                    break;
                }
            }
        });
        rx
    }
}
