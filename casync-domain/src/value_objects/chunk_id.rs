// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Identity Value Object
//!
//! `ChunkId` is the content identity of a chunk: the SHA-512/256 digest of
//! its uncompressed bytes. It is opaque, byte-wise comparable and hashable,
//! and renders as a lowercase 64-character hex string — the same form used
//! for chunk-file names (`<prefix4>/<hex_id><ext>`) and index table entries.

use sha2::{Digest, Sha512_256};
use std::fmt;

/// Length in bytes of a chunk id (SHA-512/256 digest).
pub const CHUNK_ID_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// Computes the id of `data` directly.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha512_256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; CHUNK_ID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wraps a raw 32-byte digest without recomputing it.
    pub const fn from_bytes(bytes: [u8; CHUNK_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }

    /// The first four hex characters, used as the chunk-file prefix
    /// directory, `<prefix4>/<hex_id><ext>`.
    pub fn prefix4(&self) -> String {
        hex::encode(&self.0[..2])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, crate::error::CasyncError> {
        let decoded =
            hex::decode(s).map_err(|e| crate::error::CasyncError::invalid_index(format!("bad chunk id hex: {e}")))?;
        if decoded.len() != CHUNK_ID_LEN {
            return Err(crate::error::CasyncError::invalid_index(format!(
                "chunk id must be {CHUNK_ID_LEN} bytes, got {}",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; CHUNK_ID_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Verifies that `data` hashes to this id.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for ChunkId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for ChunkId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_id() {
        let a = ChunkId::compute(b"hello world");
        let b = ChunkId::compute(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_different_id() {
        let a = ChunkId::compute(b"hello world");
        let b = ChunkId::compute(b"hello there");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips() {
        let id = ChunkId::compute(b"round trip me");
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        let back = ChunkId::from_hex(&hex).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn verify_matches_only_original_bytes() {
        let id = ChunkId::compute(b"payload");
        assert!(id.verify(b"payload"));
        assert!(!id.verify(b"not the payload"));
    }

    #[test]
    fn prefix4_is_first_two_bytes_hex() {
        let id = ChunkId::compute(b"prefix test");
        let hex = id.to_hex();
        assert_eq!(id.prefix4(), &hex[..4]);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(ChunkId::from_hex("abcd").is_err());
    }
}
