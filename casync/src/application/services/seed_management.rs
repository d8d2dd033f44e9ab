// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Seed Management
//!
//! Two concrete [`Seed`] implementations:
//!
//! - [`IndexSeed`] — an already-complete file paired with the [`Index`]
//!   describing its chunks, used to clone/copy bytes from a prior
//!   identical-or-similar file instead of re-fetching them from the store.
//! - [`SelfSeed`] — the target file being assembled right now, treated as
//!   its own seed so a chunk that recurs later in the same blob (e.g. a
//!   repeated block) can be satisfied from bytes already written, without
//!   waiting for the whole file to complete first.

use casync_domain::{CasyncError, ChunkId, Index, Seed, SeedLocation};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;

/// A completed file plus the index describing how it decomposes into
/// chunks. `validate` re-hashes the backing file's current bytes against
/// the index before assembly trusts it as a seed.
pub struct IndexSeed {
    path: PathBuf,
    lookup: HashMap<ChunkId, SeedLocation>,
}

impl IndexSeed {
    pub fn new(path: impl Into<PathBuf>, index: &Index) -> Self {
        let lookup = index
            .iter()
            .map(|chunk| (chunk.id, SeedLocation { offset: chunk.start, size: chunk.size }))
            .collect();
        Self { path: path.into(), lookup }
    }
}

#[async_trait]
impl Seed for IndexSeed {
    async fn lookup(&self, id: ChunkId) -> Option<SeedLocation> {
        self.lookup.get(&id).copied()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn validate(&self) -> Result<(), CasyncError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| CasyncError::invalid_seed(format!("seed file {} unreadable: {e}", self.path.display())))?;

        let expected_len = self.lookup.values().map(|loc| loc.offset + loc.size).max().unwrap_or(0);
        if metadata.len() < expected_len {
            return Err(CasyncError::invalid_seed(format!(
                "seed file {} is shorter ({} bytes) than its index expects ({expected_len} bytes)",
                self.path.display(),
                metadata.len()
            )));
        }

        let path = self.path.clone();
        let entries: Vec<(ChunkId, SeedLocation)> = self.lookup.iter().map(|(id, loc)| (*id, *loc)).collect();
        tokio::task::spawn_blocking(move || -> Result<(), CasyncError> {
            let file = std::fs::File::open(&path)
                .map_err(|e| CasyncError::invalid_seed(format!("seed file {} unreadable: {e}", path.display())))?;
            let mut buf = Vec::new();
            for (id, loc) in entries {
                buf.resize(loc.size as usize, 0u8);
                file.read_at(&mut buf, loc.offset).map_err(|e| {
                    CasyncError::invalid_seed(format!("reading seed {} at offset {}: {e}", path.display(), loc.offset))
                })?;
                if ChunkId::compute(&buf) != id {
                    return Err(CasyncError::invalid_seed(format!(
                        "seed file {} no longer matches its index at offset {} (bytes changed since indexing)",
                        path.display(),
                        loc.offset
                    )));
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| CasyncError::internal(format!("seed validation task panicked: {e}")))??;

        Ok(())
    }

    fn same_filesystem(&self, target_path: &Path) -> bool {
        same_filesystem(&self.path, target_path)
    }
}

/// The target file being assembled, growing monotonically as chunks land.
/// `mark_written` uses release ordering so a worker that later observes the
/// entry via `lookup`'s acquire load is guaranteed to see the write that
/// happened-before it.
pub struct SelfSeed {
    path: PathBuf,
    table: RwLock<HashMap<ChunkId, SeedLocation>>,
    high_water_mark: AtomicU64,
}

impl SelfSeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: RwLock::new(HashMap::new()),
            high_water_mark: AtomicU64::new(0),
        }
    }

    /// Records that `id`'s bytes now live at `location` in the target file.
    /// Called by the assembly worker immediately after a successful write,
    /// before the chunk's job state is advanced to a terminal state.
    pub fn mark_written(&self, id: ChunkId, location: SeedLocation) {
        self.table.write().insert(id, location);
        self.high_water_mark.fetch_max(location.offset + location.size, Ordering::Release);
    }

    pub fn bytes_written(&self) -> u64 {
        self.high_water_mark.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Seed for SelfSeed {
    async fn lookup(&self, id: ChunkId) -> Option<SeedLocation> {
        let _ = self.high_water_mark.load(Ordering::Acquire);
        self.table.read().get(&id).copied()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn validate(&self) -> Result<(), CasyncError> {
        Ok(())
    }

    fn same_filesystem(&self, target_path: &Path) -> bool {
        same_filesystem(&self.path, target_path)
    }
}

#[cfg(unix)]
fn same_filesystem(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (a.metadata(), b.metadata()) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_filesystem(_a: &Path, _b: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use casync_domain::{ChunkerParams, IndexChunk};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_index() -> Index {
        let params = ChunkerParams::new(0, 4, 4, 4).unwrap();
        let chunks = vec![
            IndexChunk { start: 0, size: 4, id: ChunkId::compute(b"aaaa") },
            IndexChunk { start: 4, size: 4, id: ChunkId::compute(b"bbbb") },
        ];
        Index::new(params, chunks).unwrap()
    }

    #[tokio::test]
    async fn index_seed_looks_up_known_chunk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"aaaabbbb").unwrap();
        let index = sample_index();
        let seed = IndexSeed::new(file.path(), &index);

        let loc = seed.lookup(ChunkId::compute(b"aaaa")).await.unwrap();
        assert_eq!(loc, SeedLocation { offset: 0, size: 4 });
        assert!(seed.lookup(ChunkId::compute(b"cccc")).await.is_none());
    }

    #[tokio::test]
    async fn index_seed_validate_rejects_truncated_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"aaaa").unwrap();
        let index = sample_index();
        let seed = IndexSeed::new(file.path(), &index);
        assert!(seed.validate().await.is_err());
    }

    #[tokio::test]
    async fn index_seed_validate_rejects_edit_in_place_with_same_length() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"aaaabbbb").unwrap();
        let index = sample_index();
        let seed = IndexSeed::new(file.path(), &index);
        assert!(seed.validate().await.is_ok());

        // Same length as the indexed file, but the bytes at offset 0 no
        // longer hash to the id the index recorded for that chunk.
        file.as_file().write_at(b"zzzz", 0).unwrap();
        assert!(seed.validate().await.is_err());
    }

    #[tokio::test]
    async fn self_seed_tracks_chunks_as_they_are_written() {
        let seed = SelfSeed::new("/tmp/target");
        let id = ChunkId::compute(b"chunk");
        assert!(seed.lookup(id).await.is_none());

        seed.mark_written(id, SeedLocation { offset: 0, size: 10 });
        assert_eq!(seed.lookup(id).await, Some(SeedLocation { offset: 0, size: 10 }));
        assert_eq!(seed.bytes_written(), 10);
    }
}
