// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Port
//!
//! `Store`/`WriteStore` are the load-bearing abstraction of this system:
//! a content-addressed key/value collection keyed by chunk id.
//! Every concrete store (on-disk, HTTP, chunk-server) and every composing
//! wrapper (router, failover, cache, dedup-queue, swap, rate-limit) in
//! `casync::infrastructure::adapters::stores` implements this pair of
//! traits, dispatching at call sites through a trait object rather than
//! an enum of concrete store kinds.
//!
//! Both traits are async: store operations may block on file or network
//! I/O, so callers await them from worker tasks rather than blocking a
//! thread.

use crate::error::CasyncError;
use crate::value_objects::{Chunk, ChunkId};
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches a chunk's storage-form bytes, wrapped with its id and the
    /// store's verification policy. Returns `ChunkMissing` if the store
    /// does not have it.
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError>;

    /// Whether the store has the chunk, without fetching its bytes.
    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError>;

    /// A short identifying string for this store, used to annotate errors
    /// as they propagate upward.
    fn id(&self) -> &str;
}

#[async_trait]
pub trait WriteStore: Store {
    /// Persists a chunk's already-converted storage bytes under `id`.
    /// Idempotent: storing the same id twice leaves the store in the same
    /// state.
    async fn store(&self, id: ChunkId, storage_bytes: Vec<u8>) -> Result<(), CasyncError>;

    /// Releases any resources (connections, file handles) held by this
    /// store. Wrapper stores propagate `close` to their inner store(s).
    async fn close(&self) -> Result<(), CasyncError>;
}
