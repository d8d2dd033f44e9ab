// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Value Object
//!
//! [`Chunk`] holds the two representations of a chunk's content — its
//! uncompressed bytes and its on-storage (converted) bytes — and lazily
//! materialises whichever one a caller didn't already have. The converter
//! chain itself lives in the application/infrastructure layers (a domain
//! type cannot depend on a concrete compressor), so `Chunk` is generic over
//! a pair of closures that perform the conversion; see
//! `casync::application::services::converter_chain` for the concrete chain
//! used in this codebase.

use crate::error::CasyncError;
use crate::value_objects::ChunkId;
use std::sync::OnceLock;

/// A chunk of content, identified by the hash of its uncompressed bytes.
///
/// Either representation may be absent until materialised. Once both are
/// present, `hash(uncompressed) == id` is guaranteed unless the chunk was
/// constructed with `skip_verify`, in which case verification is deferred to
/// the first access of `uncompressed()`.
pub struct Chunk {
    id: ChunkId,
    uncompressed: OnceLock<Vec<u8>>,
    storage: OnceLock<Vec<u8>>,
    skip_verify: bool,
}

impl Chunk {
    /// Constructs a chunk from known-good uncompressed bytes, verifying the
    /// hash immediately.
    pub fn from_uncompressed(data: Vec<u8>) -> Result<Self, CasyncError> {
        let id = ChunkId::compute(&data);
        Self::from_uncompressed_with_id(id, data)
    }

    /// Constructs a chunk from uncompressed bytes with a known id, verifying
    /// they match.
    pub fn from_uncompressed_with_id(id: ChunkId, data: Vec<u8>) -> Result<Self, CasyncError> {
        if !id.verify(&data) {
            return Err(CasyncError::chunk_invalid(id));
        }
        let uncompressed = OnceLock::new();
        uncompressed.set(data).ok();
        Ok(Self {
            id,
            uncompressed,
            storage: OnceLock::new(),
            skip_verify: false,
        })
    }

    /// Constructs a chunk from storage-form bytes plus its expected id.
    /// Verification of `hash(uncompressed) == id` is deferred until the
    /// uncompressed form is materialised (requires the converter chain, so
    /// it cannot happen inside this constructor).
    pub fn from_storage(id: ChunkId, storage_bytes: Vec<u8>, skip_verify: bool) -> Self {
        let storage = OnceLock::new();
        storage.set(storage_bytes).ok();
        Self {
            id,
            uncompressed: OnceLock::new(),
            storage,
            skip_verify,
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn skip_verify(&self) -> bool {
        self.skip_verify
    }

    /// Returns the uncompressed bytes if already materialised, without
    /// triggering a from-storage conversion.
    pub fn uncompressed_if_present(&self) -> Option<&[u8]> {
        self.uncompressed.get().map(Vec::as_slice)
    }

    pub fn storage_if_present(&self) -> Option<&[u8]> {
        self.storage.get().map(Vec::as_slice)
    }

    /// Materialises the uncompressed form from `from_storage_bytes`, a
    /// closure applying the converter chain's `from_storage` direction in
    /// reverse order, then verifies the hash unless `skip_verify` is set.
    pub fn materialize_uncompressed(
        &self,
        from_storage_bytes: impl FnOnce(&[u8]) -> Result<Vec<u8>, CasyncError>,
    ) -> Result<&[u8], CasyncError> {
        if let Some(existing) = self.uncompressed.get() {
            return Ok(existing);
        }
        let storage = self
            .storage
            .get()
            .ok_or_else(|| CasyncError::internal("chunk has neither uncompressed nor storage bytes"))?;
        let data = from_storage_bytes(storage)?;
        if !self.skip_verify && !self.id.verify(&data) {
            return Err(CasyncError::chunk_invalid(self.id));
        }
        Ok(self.uncompressed.get_or_init(|| data))
    }

    /// Materialises the storage form from `to_storage_bytes`, a closure
    /// applying the converter chain's `to_storage` direction in order.
    pub fn materialize_storage(
        &self,
        to_storage_bytes: impl FnOnce(&[u8]) -> Result<Vec<u8>, CasyncError>,
    ) -> Result<&[u8], CasyncError> {
        if let Some(existing) = self.storage.get() {
            return Ok(existing);
        }
        let uncompressed = self
            .uncompressed
            .get()
            .ok_or_else(|| CasyncError::internal("chunk has no uncompressed bytes to convert"))?;
        let data = to_storage_bytes(uncompressed)?;
        Ok(self.storage.get_or_init(|| data))
    }
}

/// The canonical chunk of `max_size` zero bytes. Runs of zeros in a blob
/// chunk to repeated references to this chunk's id, which the assembly
/// engine special-cases into a hole-punch.
pub struct NullChunk {
    max_size: u64,
    id: OnceLock<ChunkId>,
}

impl NullChunk {
    pub const fn new(max_size: u64) -> Self {
        Self {
            max_size,
            id: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ChunkId {
        *self.id.get_or_init(|| {
            // Computing the id of `max_size` zero bytes once and memoising it
            // avoids re-hashing a (potentially 256KiB+) zero buffer for every
            // null chunk encountered during assembly.
            let zeros = vec![0u8; self.max_size as usize];
            ChunkId::compute(&zeros)
        })
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_uncompressed_computes_matching_id() {
        let chunk = Chunk::from_uncompressed(b"payload".to_vec()).unwrap();
        assert_eq!(chunk.id(), ChunkId::compute(b"payload"));
        assert_eq!(chunk.uncompressed_if_present(), Some(b"payload".as_slice()));
    }

    #[test]
    fn from_uncompressed_with_wrong_id_fails() {
        let wrong_id = ChunkId::compute(b"different");
        assert!(Chunk::from_uncompressed_with_id(wrong_id, b"payload".to_vec()).is_err());
    }

    #[test]
    fn materialize_uncompressed_verifies_hash() {
        let id = ChunkId::compute(b"payload");
        let chunk = Chunk::from_storage(id, b"STORAGE:payload".to_vec(), false);
        let result = chunk.materialize_uncompressed(|storage| {
            Ok(storage.strip_prefix(b"STORAGE:").unwrap().to_vec())
        });
        assert_eq!(result.unwrap(), b"payload");
    }

    #[test]
    fn materialize_uncompressed_rejects_mismatch() {
        let id = ChunkId::compute(b"payload");
        let chunk = Chunk::from_storage(id, b"garbage".to_vec(), false);
        let result = chunk.materialize_uncompressed(|storage| Ok(storage.to_vec()));
        assert!(matches!(result, Err(CasyncError::ChunkInvalid { .. })));
    }

    #[test]
    fn skip_verify_defers_but_does_not_enforce() {
        let id = ChunkId::compute(b"payload");
        let chunk = Chunk::from_storage(id, b"garbage".to_vec(), true);
        let result = chunk.materialize_uncompressed(|storage| Ok(storage.to_vec()));
        assert!(result.is_ok());
    }

    #[test]
    fn null_chunk_id_is_stable() {
        let null = NullChunk::new(256 * 1024);
        let id1 = null.id();
        let id2 = null.id();
        assert_eq!(id1, id2);
        let zeros = vec![0u8; 256 * 1024];
        assert_eq!(id1, ChunkId::compute(&zeros));
    }
}
