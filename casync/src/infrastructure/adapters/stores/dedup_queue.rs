// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dedup Queue
//!
//! [`DedupQueue`] single-flights concurrent `get` calls for the same chunk
//! id against its inner store: the first caller for an id does the real
//! fetch, concurrent callers for the same id await that result instead of
//! issuing their own redundant fetch. [`WriteDedupQueue`] adds the same
//! treatment for `store`, with an independent in-flight map so a read and
//! a write for the same id never block each other.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store, WriteStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;

type ReadWaiters = AsyncMutex<HashMap<ChunkId, broadcast::Sender<Result<Arc<[u8]>, String>>>>;
type WriteWaiters = AsyncMutex<HashMap<ChunkId, broadcast::Sender<Result<(), String>>>>;

/// Single-flights reads against an inner store.
pub struct DedupQueue {
    id: String,
    inner: Arc<dyn Store>,
    in_flight: ReadWaiters,
}

impl DedupQueue {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Store>) -> Self {
        Self {
            id: id.into(),
            inner,
            in_flight: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Store for DedupQueue {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        let mut guard = self.in_flight.lock().await;
        if let Some(sender) = guard.get(&id) {
            let mut receiver = sender.subscribe();
            drop(guard);
            return match receiver.recv().await {
                Ok(Ok(bytes)) => Ok(Chunk::from_storage(id, bytes.to_vec(), false)),
                Ok(Err(msg)) => Err(CasyncError::internal(msg)),
                Err(_) => Err(CasyncError::internal("dedup queue sender dropped before completion")),
            };
        }

        let (sender, _receiver) = broadcast::channel(1);
        guard.insert(id, sender.clone());
        drop(guard);

        let result = self.inner.get(id).await;
        self.in_flight.lock().await.remove(&id);

        match result {
            Ok(chunk) => {
                let bytes: Arc<[u8]> = chunk.storage_if_present().unwrap_or(&[]).into();
                let _ = sender.send(Ok(bytes.clone()));
                Ok(Chunk::from_storage(id, bytes.to_vec(), false))
            }
            Err(e) => {
                let _ = sender.send(Err(e.to_string()));
                Err(e)
            }
        }
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        self.inner.has(id).await
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Single-flights both reads and writes, via independent in-flight maps.
pub struct WriteDedupQueue {
    id: String,
    inner: Arc<dyn WriteStore>,
    read_in_flight: ReadWaiters,
    write_in_flight: WriteWaiters,
}

impl WriteDedupQueue {
    pub fn new(id: impl Into<String>, inner: Arc<dyn WriteStore>) -> Self {
        Self {
            id: id.into(),
            inner,
            read_in_flight: AsyncMutex::new(HashMap::new()),
            write_in_flight: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Store for WriteDedupQueue {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        let mut guard = self.read_in_flight.lock().await;
        if let Some(sender) = guard.get(&id) {
            let mut receiver = sender.subscribe();
            drop(guard);
            return match receiver.recv().await {
                Ok(Ok(bytes)) => Ok(Chunk::from_storage(id, bytes.to_vec(), false)),
                Ok(Err(msg)) => Err(CasyncError::internal(msg)),
                Err(_) => Err(CasyncError::internal("dedup queue sender dropped before completion")),
            };
        }
        let (sender, _receiver) = broadcast::channel(1);
        guard.insert(id, sender.clone());
        drop(guard);

        let result = self.inner.get(id).await;
        self.read_in_flight.lock().await.remove(&id);
        match result {
            Ok(chunk) => {
                let bytes: Arc<[u8]> = chunk.storage_if_present().unwrap_or(&[]).into();
                let _ = sender.send(Ok(bytes.clone()));
                Ok(Chunk::from_storage(id, bytes.to_vec(), false))
            }
            Err(e) => {
                let _ = sender.send(Err(e.to_string()));
                Err(e)
            }
        }
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        self.inner.has(id).await
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl WriteStore for WriteDedupQueue {
    async fn store(&self, id: ChunkId, storage_bytes: Vec<u8>) -> Result<(), CasyncError> {
        let mut guard = self.write_in_flight.lock().await;
        if let Some(sender) = guard.get(&id) {
            let mut receiver = sender.subscribe();
            drop(guard);
            return match receiver.recv().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(msg)) => Err(CasyncError::internal(msg)),
                Err(_) => Err(CasyncError::internal("dedup queue sender dropped before completion")),
            };
        }
        let (sender, _receiver) = broadcast::channel(1);
        guard.insert(id, sender.clone());
        drop(guard);

        let result = self.inner.store(id, storage_bytes).await;
        self.write_in_flight.lock().await.remove(&id);
        match &result {
            Ok(()) => {
                let _ = sender.send(Ok(()));
            }
            Err(e) => {
                let _ = sender.send(Err(e.to_string()));
            }
        }
        result
    }

    async fn close(&self) -> Result<(), CasyncError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::stores::local_store::LocalStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn concurrent_gets_for_same_id_single_flight() {
        let dir = tempdir().unwrap();
        let local = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local.store(id, b"bytes".to_vec()).await.unwrap();

        let queue = Arc::new(DedupQueue::new("dedup", Arc::new(local)));
        let q1 = queue.clone();
        let q2 = queue.clone();
        let (r1, r2) = tokio::join!(q1.get(id), q2.get(id));
        assert_eq!(r1.unwrap().storage_if_present(), Some(b"bytes".as_slice()));
        assert_eq!(r2.unwrap().storage_if_present(), Some(b"bytes".as_slice()));
    }

    #[tokio::test]
    async fn write_dedup_queue_stores_and_reads() {
        let dir = tempdir().unwrap();
        let local: Arc<dyn WriteStore> = Arc::new(LocalStore::new(dir.path(), ".cacnk"));
        let queue = WriteDedupQueue::new("write-dedup", local);
        let id = ChunkId::compute(b"payload");

        queue.store(id, b"bytes".to_vec()).await.unwrap();
        let chunk = queue.get(id).await.unwrap();
        assert_eq!(chunk.storage_if_present(), Some(b"bytes".as_slice()));
    }
}
