// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rate Limited Store
//!
//! [`RateLimitedStore`] throttles `get`/`has` calls to its inner store with
//! a token bucket: `rate` tokens per second refill, up to `burst` tokens
//! banked. Two modes: `Block` waits (up to an optional timeout)
//! for a token to become available, `Fail` returns `RateLimitExceeded`
//! immediately when the bucket is empty.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store, WriteStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub enum RateLimitMode {
    Block { timeout: Option<Duration> },
    Fail,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimitedStore {
    id: String,
    inner: Arc<dyn WriteStore>,
    rate_per_sec: f64,
    burst: f64,
    mode: RateLimitMode,
    bucket: Mutex<Bucket>,
}

impl RateLimitedStore {
    pub fn new(id: impl Into<String>, inner: Arc<dyn WriteStore>, rate_per_sec: f64, burst: f64, mode: RateLimitMode) -> Self {
        Self {
            id: id.into(),
            inner,
            rate_per_sec,
            burst,
            mode,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    fn try_take_token(&self) -> bool {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    async fn acquire(&self) -> Result<(), CasyncError> {
        if self.try_take_token() {
            return Ok(());
        }
        match self.mode {
            RateLimitMode::Fail => Err(CasyncError::RateLimitExceeded),
            RateLimitMode::Block { timeout } => {
                let deadline = timeout.map(|d| Instant::now() + d);
                loop {
                    let retry_after = Duration::from_secs_f64((1.0 / self.rate_per_sec).max(0.001));
                    tokio::time::sleep(retry_after).await;
                    if self.try_take_token() {
                        return Ok(());
                    }
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(CasyncError::RateLimitExceeded);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Store for RateLimitedStore {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        self.acquire().await?;
        self.inner.get(id).await
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        self.acquire().await?;
        self.inner.has(id).await
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl WriteStore for RateLimitedStore {
    async fn store(&self, id: ChunkId, storage_bytes: Vec<u8>) -> Result<(), CasyncError> {
        self.acquire().await?;
        self.inner.store(id, storage_bytes).await
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
    async fn fail_mode_rejects_once_bucket_empty() {
        let dir = tempdir().unwrap();
        let local = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local.store(id, b"bytes".to_vec()).await.unwrap();

        let limited = RateLimitedStore::new("limited", Arc::new(local), 0.001, 1.0, RateLimitMode::Fail);
        assert!(limited.has(id).await.unwrap());
        assert!(matches!(limited.has(id).await.unwrap_err(), CasyncError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn block_mode_waits_for_refill() {
        let dir = tempdir().unwrap();
        let local = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        local.store(id, b"bytes".to_vec()).await.unwrap();

        let limited = RateLimitedStore::new(
            "limited",
            Arc::new(local),
            50.0,
            1.0,
            RateLimitMode::Block {
                timeout: Some(Duration::from_secs(1)),
            },
        );
        limited.has(id).await.unwrap();
        assert!(limited.has(id).await.unwrap());
    }
}
