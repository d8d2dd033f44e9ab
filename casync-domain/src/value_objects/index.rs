// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Index Value Objects
//!
//! An [`Index`] is the ordered manifest of [`IndexChunk`] entries that
//! describes how a logical blob decomposes into content-addressed chunks.
//! It is produced once by the chunker and never mutated afterwards; the
//! binary on-disk encoding lives in `casync`'s infrastructure layer
//! (`infrastructure::codec::index_codec`), not here — the domain only owns
//! the structure and its invariants.

use crate::error::CasyncError;
use crate::value_objects::{ChunkId, ChunkerParams};

/// One entry in an index: the chunk's byte range within the logical blob
/// plus its content id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexChunk {
    pub start: u64,
    pub size: u64,
    pub id: ChunkId,
}

impl IndexChunk {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub params: ChunkerParams,
    chunks: Vec<IndexChunk>,
}

impl Index {
    /// Builds an index from chunker output, validating that chunks form
    /// contiguous non-overlapping ranges starting at zero, with every
    /// non-final chunk within `[min_size, max_size]`.
    pub fn new(params: ChunkerParams, chunks: Vec<IndexChunk>) -> Result<Self, CasyncError> {
        Self::validate(&params, &chunks)?;
        Ok(Self { params, chunks })
    }

    fn validate(params: &ChunkerParams, chunks: &[IndexChunk]) -> Result<(), CasyncError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks[0].start != 0 {
            return Err(CasyncError::invalid_index("first chunk must start at offset 0"));
        }
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && chunk.start != chunks[i - 1].end() {
                return Err(CasyncError::invalid_index(format!(
                    "chunk {i} starts at {} but previous chunk ends at {}",
                    chunk.start,
                    chunks[i - 1].end()
                )));
            }
            let is_final = i == last;
            if chunk.size > params.max_size {
                return Err(CasyncError::invalid_index(format!(
                    "chunk {i} size {} exceeds max_size {}",
                    chunk.size, params.max_size
                )));
            }
            if !is_final && chunk.size < params.min_size {
                return Err(CasyncError::invalid_index(format!(
                    "non-final chunk {i} size {} below min_size {}",
                    chunk.size, params.min_size
                )));
            }
            if chunk.size == 0 {
                return Err(CasyncError::invalid_index(format!("chunk {i} has zero size")));
            }
        }
        Ok(())
    }

    pub fn chunks(&self) -> &[IndexChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total length of the logical blob this index describes.
    pub fn total_length(&self) -> u64 {
        self.chunks.last().map(|c| c.end()).unwrap_or(0)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexChunk> {
        self.chunks.iter()
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a IndexChunk;
    type IntoIter = std::slice::Iter<'a, IndexChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: u64, size: u64) -> IndexChunk {
        IndexChunk {
            start,
            size,
            id: ChunkId::compute(&start.to_le_bytes()),
        }
    }

    #[test]
    fn empty_index_is_valid() {
        let index = Index::new(ChunkerParams::default(), vec![]).unwrap();
        assert_eq!(index.total_length(), 0);
    }

    #[test]
    fn contiguous_chunks_are_valid() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(0, 10), chunk(10, 10), chunk(20, 5)];
        let index = Index::new(params, chunks).unwrap();
        assert_eq!(index.total_length(), 25);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn final_chunk_may_be_shorter_than_min() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(0, 10), chunk(10, 1)];
        assert!(Index::new(params, chunks).is_ok());
    }

    #[test]
    fn non_final_chunk_below_min_is_rejected() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(0, 5), chunk(5, 10)];
        assert!(Index::new(params, chunks).is_err());
    }

    #[test]
    fn gap_between_chunks_is_rejected() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(0, 10), chunk(11, 10)];
        assert!(Index::new(params, chunks).is_err());
    }

    #[test]
    fn first_chunk_must_start_at_zero() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(1, 10)];
        assert!(Index::new(params, chunks).is_err());
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let params = ChunkerParams::new(0, 10, 10, 10).unwrap();
        let chunks = vec![chunk(0, 11)];
        assert!(Index::new(params, chunks).is_err());
    }
}
