// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Failover Group
//!
//! [`FailoverGroup`] treats its replicas as interchangeable mirrors of the
//! same content: it starts at the current "active" replica (an
//! atomically-rotated index, so concurrent callers racing a failover all
//! observe a consistent replica ordering) and rotates past any replica
//! that returns an error *other than* missing. A `ChunkMissing` is taken
//! at face value — since replicas are expected to hold identical data, no
//! sibling is expected to have it either — and returned immediately
//! without trying the rest.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct FailoverGroup {
    id: String,
    replicas: Vec<Arc<dyn Store>>,
    active: AtomicUsize,
}

impl FailoverGroup {
    pub fn new(id: impl Into<String>, replicas: Vec<Arc<dyn Store>>) -> Self {
        Self {
            id: id.into(),
            replicas,
            active: AtomicUsize::new(0),
        }
    }

    fn rotation_order(&self) -> Vec<usize> {
        let start = self.active.load(Ordering::Acquire) % self.replicas.len().max(1);
        (0..self.replicas.len()).map(|i| (start + i) % self.replicas.len()).collect()
    }
}

#[async_trait]
impl Store for FailoverGroup {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        let mut last_err = None;
        for idx in self.rotation_order() {
            match self.replicas[idx].get(id).await {
                Ok(chunk) => {
                    self.active.store(idx, Ordering::Release);
                    return Ok(chunk);
                }
                Err(e) if e.is_missing() => return Err(e),
                Err(e) => {
                    last_err = Some(e.with_store_identity(self.replicas[idx].id()));
                    continue;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CasyncError::chunk_missing(id)))
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        let mut last_err = None;
        for idx in self.rotation_order() {
            match self.replicas[idx].has(id).await {
                Ok(true) => {
                    self.active.store(idx, Ordering::Release);
                    return Ok(true);
                }
                Ok(false) => return Ok(false),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(false),
        }
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

    /// A replica that always fails with a non-missing error, for exercising
    /// the rotate-past-other-errors path independently of `ChunkMissing`.
    struct FlakyStore;

    #[async_trait]
    impl Store for FlakyStore {
        async fn get(&self, _id: ChunkId) -> Result<Chunk, CasyncError> {
            Err(CasyncError::internal("simulated replica failure"))
        }

        async fn has(&self, _id: ChunkId) -> Result<bool, CasyncError> {
            Err(CasyncError::internal("simulated replica failure"))
        }

        fn id(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn missing_from_active_replica_returns_immediately_without_rotating() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let local_b = LocalStore::new(dir_b.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local_b.store(id, b"bytes".to_vec()).await.unwrap();

        let group = FailoverGroup::new(
            "group",
            vec![
                Arc::new(LocalStore::new(dir_a.path(), ".cacnk")) as Arc<dyn Store>,
                Arc::new(local_b) as Arc<dyn Store>,
            ],
        );
        let err = group.get(id).await.unwrap_err();
        assert!(err.is_missing());
        assert_eq!(group.active.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn rotates_past_non_missing_error_to_next_replica() {
        let dir_b = tempdir().unwrap();
        let local_b = LocalStore::new(dir_b.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local_b.store(id, b"bytes".to_vec()).await.unwrap();

        let group = FailoverGroup::new(
            "group",
            vec![Arc::new(FlakyStore) as Arc<dyn Store>, Arc::new(local_b) as Arc<dyn Store>],
        );
        let chunk = group.get(id).await.unwrap();
        assert_eq!(chunk.storage_if_present(), Some(b"bytes".as_slice()));
        assert_eq!(group.active.load(Ordering::Acquire), 1);
    }
}
