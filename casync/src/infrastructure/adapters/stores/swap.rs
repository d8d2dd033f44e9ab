// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Swap Store
//!
//! [`SwapStore`] lets the inner store be atomically replaced at runtime
//! (e.g. rotating to a new remote endpoint without restarting a
//! long-running process), guarded by a `RwLock` so in-flight reads never
//! observe a half-swapped state. A swap from a writable inner store to a
//! read-only one is refused: swapping away write capability out from
//! under in-flight writers would be a silent capability downgrade.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct SwapStore {
    id: String,
    inner: RwLock<Arc<dyn Store>>,
    inner_is_writable: RwLock<bool>,
}

impl SwapStore {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Store>, writable: bool) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(inner),
            inner_is_writable: RwLock::new(writable),
        }
    }

    /// Replaces the inner store. Returns `InvalidConfiguration` if this
    /// would downgrade a writable store to a non-writable one.
    pub fn swap(&self, new_inner: Arc<dyn Store>, new_is_writable: bool) -> Result<(), CasyncError> {
        let currently_writable = *self.inner_is_writable.read();
        if currently_writable && !new_is_writable {
            return Err(CasyncError::InvalidConfiguration(
                "refusing to swap a writable store for a non-writable one".to_string(),
            ));
        }
        *self.inner.write() = new_inner;
        *self.inner_is_writable.write() = new_is_writable;
        Ok(())
    }

    fn current(&self) -> Arc<dyn Store> {
        self.inner.read().clone()
    }
}

#[async_trait]
impl Store for SwapStore {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        self.current().get(id).await
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        self.current().has(id).await
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::stores::local_store::LocalStore;
    use casync_domain::WriteStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn swap_replaces_inner_store() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let local_b = LocalStore::new(dir_b.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local_b.store(id, b"bytes".to_vec()).await.unwrap();

        let swap = SwapStore::new("swap", Arc::new(LocalStore::new(dir_a.path(), ".cacnk")), false);
        assert!(!swap.has(id).await.unwrap());

        swap.swap(Arc::new(local_b), false).unwrap();
        assert!(swap.has(id).await.unwrap());
    }

    #[tokio::test]
    async fn refuses_writable_to_non_writable_downgrade() {
        let dir = tempdir().unwrap();
        let swap = SwapStore::new("swap", Arc::new(LocalStore::new(dir.path(), ".cacnk")), true);
        let dir2 = tempdir().unwrap();
        let result = swap.swap(Arc::new(LocalStore::new(dir2.path(), ".cacnk")), false);
        assert!(result.is_err());
    }
}
