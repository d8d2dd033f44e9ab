// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Storage Pipeline
//!
//! Drives the per-chunk storage protocol: an in-process memo
//! check (skip chunks already seen this run), a `store.has` idempotence
//! check (skip chunks the store already holds), a positioned read of the
//! source file, hash verification, converter-chain application, and
//! `store.store`. `N` tokio worker tasks consume chunk records from a
//! bounded channel fed by the chunker; any worker error cancels the
//! producer and the remaining workers (first-error-wins).

use crate::application::services::chunker::{AsyncChunker, ChunkRecord};
use casync_domain::{CasyncError, ChunkerParams, Converter, Index, IndexChunk, WriteStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Chunk-provenance counters accumulated across the worker pool, returned
/// as a structured result rather than only `Result<(), Error>`.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub chunks_stored: AtomicU64,
    pub chunks_deduped_memo: AtomicU64,
    pub chunks_already_in_store: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Chunks an input file and stores every distinct chunk into `store`,
/// applying `converter` to each chunk's bytes before the store write.
/// Returns the resulting [`Index`] plus accumulated [`PipelineStats`].
///
/// `source` must be `Send + 'static` because the chunker runs on a
/// `spawn_blocking` task (see [`AsyncChunker`]).
pub async fn chunk_and_store<R>(
    source: R,
    params: ChunkerParams,
    store: Arc<dyn WriteStore>,
    converter: Arc<dyn Converter>,
    worker_count: usize,
    channel_depth: usize,
    cancel: casync_bootstrap::shutdown::CancellationToken,
) -> Result<(Index, PipelineStats), CasyncError>
where
    R: std::io::Read + Send + 'static,
{
    let stats = Arc::new(PipelineStats::new());
    let index_chunks = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let first_error: Arc<Mutex<Option<CasyncError>>> = Arc::new(Mutex::new(None));

    let mut rx = AsyncChunker::spawn(source, params, channel_depth);

    let mut join_set = tokio::task::JoinSet::new();
    while let Some(item) = rx.recv().await {
        if cancel.is_cancelled() {
            return Err(CasyncError::Interrupted);
        }
        if first_error.lock().unwrap().is_some() {
            break;
        }

        let record = match item {
            Ok(record) => record,
            Err(e) => {
                *first_error.lock().unwrap() = Some(e.clone());
                break;
            }
        };

        let permit = semaphore.clone().acquire_owned().await.map_err(|_| CasyncError::Interrupted)?;
        let store = store.clone();
        let converter = converter.clone();
        let stats = stats.clone();
        let index_chunks = index_chunks.clone();
        let seen = seen.clone();
        let first_error = first_error.clone();
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return;
            }
            let result = process_one_chunk(&record, &*store, converter, &stats, &seen).await;
            match result {
                Ok(()) => {
                    index_chunks.lock().unwrap().push(IndexChunk {
                        start: record.start,
                        size: record.size(),
                        id: record.id,
                    });
                }
                Err(e) => {
                    let mut slot = first_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    cancel.cancel();
                }
            }
        });
    }

    while join_set.join_next().await.is_some() {}

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }

    let mut chunks = Arc::try_unwrap(index_chunks).unwrap().into_inner().unwrap();
    chunks.sort_by_key(|c| c.start);
    let index = Index::new(params, chunks)?;
    let stats = Arc::try_unwrap(stats).unwrap_or_else(|arc| PipelineStats {
        chunks_stored: AtomicU64::new(arc.chunks_stored.load(Ordering::Relaxed)),
        chunks_deduped_memo: AtomicU64::new(arc.chunks_deduped_memo.load(Ordering::Relaxed)),
        chunks_already_in_store: AtomicU64::new(arc.chunks_already_in_store.load(Ordering::Relaxed)),
        bytes_written: AtomicU64::new(arc.bytes_written.load(Ordering::Relaxed)),
    });
    Ok((index, stats))
}

async fn process_one_chunk(
    record: &ChunkRecord,
    store: &dyn WriteStore,
    converter: Arc<dyn Converter>,
    stats: &PipelineStats,
    seen: &Mutex<HashSet<casync_domain::ChunkId>>,
) -> Result<(), CasyncError> {
    {
        let mut seen = seen.lock().unwrap();
        if !seen.insert(record.id) {
            stats.chunks_deduped_memo.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    }

    if store.has(record.id).await? {
        stats.chunks_already_in_store.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let data = record.data.clone();
    let storage_bytes = tokio::task::spawn_blocking(move || converter.to_storage(&data))
        .await
        .map_err(|e| CasyncError::internal(format!("conversion task panicked: {e}")))??;

    let len = storage_bytes.len() as u64;
    store.store(record.id, storage_bytes).await?;
    stats.chunks_stored.fetch_add(1, Ordering::Relaxed);
    stats.bytes_written.fetch_add(len, Ordering::Relaxed);
    Ok(())
}
