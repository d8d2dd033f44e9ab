// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Router Store
//!
//! [`Router`] tries each of its routes in order and returns the first one
//! that has the requested chunk, falling through to the next on
//! `ChunkMissing`. Any other error is returned immediately, annotated with
//! the failing route's identity.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store};
use std::sync::Arc;

pub struct Router {
    id: String,
    routes: Vec<Arc<dyn Store>>,
}

impl Router {
    pub fn new(id: impl Into<String>, routes: Vec<Arc<dyn Store>>) -> Self {
        Self { id: id.into(), routes }
    }
}

#[async_trait]
impl Store for Router {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        for route in &self.routes {
            match route.get(id).await {
                Ok(chunk) => return Ok(chunk),
                Err(e) if e.is_missing() => continue,
                Err(e) => return Err(e.with_store_identity(route.id())),
            }
        }
        Err(CasyncError::chunk_missing(id))
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        for route in &self.routes {
            match route.has(id).await {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(e) => return Err(e.with_store_identity(route.id())),
            }
        }
        Ok(false)
    }

    fn id(&self) -> &str {
        &self.id
    }
}
