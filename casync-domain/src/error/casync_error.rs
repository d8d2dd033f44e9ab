// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Type
//!
//! `CasyncError` is the single error enum shared by the chunker, the index
//! codec, the store abstraction, the converter chain and the assembly
//! engine. Each variant names a failure mode from the error taxonomy; none
//! of them carry backtraces or source chains beyond a `String` so that the
//! type stays `Clone` and cheap to pass through wrapper stores that annotate
//! errors with their own identity.

use crate::value_objects::ChunkId;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CasyncError {
    /// A store does not contain the requested chunk. Not a failure for the
    /// router/cache/failover wrappers during their own search; fatal at the
    /// top of assembly if no source can supply the chunk.
    #[error("chunk missing: {id}")]
    ChunkMissing { id: ChunkId },

    /// Bytes retrieved for a chunk do not hash to the requested id after
    /// conversion. `RepairableCache` downgrades this to `ChunkMissing` so
    /// callers re-fetch from the remote.
    #[error("chunk invalid: {id}")]
    ChunkInvalid { id: ChunkId },

    /// Index bytes are malformed: bad magic, unknown record type, or a
    /// truncated payload.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// A seed's index does not match the current bytes of its backing file.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Cancellation was observed by a worker or the coordinator.
    #[error("interrupted")]
    Interrupted,

    /// A `RateLimitedStore` configured to wait gave up after its timeout.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The chunk-server wire protocol saw an unexpected message type, a
    /// truncated frame, or a handshake violation.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Underlying file or network I/O failure.
    #[error("io error: {0}")]
    Io(String),

    /// Malformed configuration: chunker parameters out of order, an invalid
    /// store URL, an unreadable config file.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Anything else: a bug, an invariant violation, a `should be
    /// unreachable` branch.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CasyncError {
    pub fn chunk_missing(id: ChunkId) -> Self {
        Self::ChunkMissing { id }
    }

    pub fn chunk_invalid(id: ChunkId) -> Self {
        Self::ChunkInvalid { id }
    }

    pub fn invalid_index(msg: impl Into<String>) -> Self {
        Self::InvalidIndex(msg.into())
    }

    pub fn invalid_seed(msg: impl Into<String>) -> Self {
        Self::InvalidSeed(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a caller might reasonably retry the operation that produced
    /// this error (used by `StoreOptions.error_retry` consumers).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CasyncError::Io(_) | CasyncError::RateLimitExceeded)
    }

    /// Whether this error represents "the chunk is not here", as opposed to
    /// a hard failure. Router/failover wrappers branch on this.
    pub fn is_missing(&self) -> bool {
        matches!(self, CasyncError::ChunkMissing { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            CasyncError::ChunkMissing { .. } => "missing",
            CasyncError::ChunkInvalid { .. } => "integrity",
            CasyncError::InvalidIndex(_) => "index",
            CasyncError::InvalidSeed(_) => "seed",
            CasyncError::Interrupted => "cancellation",
            CasyncError::RateLimitExceeded => "rate-limit",
            CasyncError::ProtocolError(_) => "protocol",
            CasyncError::Io(_) => "io",
            CasyncError::InvalidConfiguration(_) => "configuration",
            CasyncError::Internal(_) => "internal",
        }
    }

    /// Wraps this error with the identity of the store that produced it, so
    /// callers composing several stores can tell which one failed.
    pub fn with_store_identity(self, store_id: &str) -> Self {
        match self {
            CasyncError::Io(msg) => CasyncError::Io(format!("{store_id}: {msg}")),
            CasyncError::ProtocolError(msg) => CasyncError::ProtocolError(format!("{store_id}: {msg}")),
            CasyncError::Internal(msg) => CasyncError::Internal(format!("{store_id}: {msg}")),
            other => other,
        }
    }
}

impl From<std::io::Error> for CasyncError {
    fn from(err: std::io::Error) -> Self {
        CasyncError::Io(err.to_string())
    }
}
