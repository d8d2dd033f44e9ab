// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache / RepairableCache
//!
//! [`Cache`] sits in front of a slower `inner` store: `get` checks the
//! cache first, falling through to `inner` and populating the cache on a
//! cache miss. [`RepairableCache`] additionally downgrades a
//! `ChunkInvalid` hit in the cache to `ChunkMissing` so the caller re-fetches
//! from `inner` — the cache owns its local store uniquely, so it
//! is free to repair a corrupted entry by simply overwriting it on the
//! next successful fetch.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store, WriteStore};
use std::sync::Arc;

pub struct Cache<C> {
    id: String,
    cache: C,
    inner: Arc<dyn Store>,
}

impl<C> Cache<C>
where
    C: WriteStore,
{
    pub fn new(id: impl Into<String>, cache: C, inner: Arc<dyn Store>) -> Self {
        Self { id: id.into(), cache, inner }
    }

    async fn populate_from_inner(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        let chunk = self.inner.get(id).await?;
        if let Some(bytes) = chunk.storage_if_present() {
            self.cache.store(id, bytes.to_vec()).await?;
        }
        Ok(chunk)
    }
}

#[async_trait]
impl<C: WriteStore> Store for Cache<C> {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        match self.cache.get(id).await {
            Ok(chunk) => Ok(chunk),
            Err(e) if e.is_missing() => self.populate_from_inner(id).await,
            Err(e) => Err(e),
        }
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        if self.cache.has(id).await? {
            return Ok(true);
        }
        self.inner.has(id).await
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Wraps [`Cache`] so a corrupted cache entry is treated as a miss rather
/// than a hard failure, and is repaired in place from `inner`.
pub struct RepairableCache<C> {
    inner_cache: Cache<C>,
}

impl<C: WriteStore> RepairableCache<C> {
    pub fn new(id: impl Into<String>, cache: C, inner: Arc<dyn Store>) -> Self {
        Self {
            inner_cache: Cache::new(id, cache, inner),
        }
    }
}

#[async_trait]
impl<C: WriteStore> Store for RepairableCache<C> {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        match self.inner_cache.cache.get(id).await {
            Ok(chunk) => Ok(chunk),
            Err(CasyncError::ChunkInvalid { .. }) | Err(CasyncError::ChunkMissing { .. }) => {
                self.inner_cache.populate_from_inner(id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        self.inner_cache.has(id).await
    }

    fn id(&self) -> &str {
        &self.inner_cache.id
    }
}
