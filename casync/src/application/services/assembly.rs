// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Assembly Engine
//!
//! Reconstructs a target file from an [`Index`], consulting seeds before
//! falling back to the chunk store. For every chunk the
//! decision procedure tries, in order:
//!
//! 1. **In-place** — the target file's bytes at this offset already hash to
//!    the chunk id (a prior partial run, or a file being updated in place).
//! 2. **Null-chunk hole-punch** — the chunk is the canonical all-zero
//!    chunk; skip writing it and rely on the target being sparse-created
//!    rather than written explicitly.
//! 3. **Seed-clone** — a seed has this chunk and shares the target's
//!    filesystem; `copy_file_range` the bytes across, splitting into
//!    aligned/unaligned sub-ranges if the seed's chunk boundaries don't
//!    coincide exactly with the clone range's filesystem block size.
//! 4. **Seed-copy** — a seed has this chunk but cloning isn't applicable;
//!    read its bytes and write them to the target.
//! 5. **Store-fetch** — no seed has it; fetch from the chunk store and
//!    convert back to uncompressed bytes.
//!
//! `N` worker tasks pull disjoint chunk jobs from a shared queue and drive
//! each through [`ChunkJobState`] to a terminal state exactly once.

use casync_domain::{CasyncError, Chunk, ChunkId, ChunkJobState, Converter, ExtractStats, Index, NullChunk, Seed, Store};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::application::services::seed_management::{IndexSeed, SelfSeed};

/// Governs what happens when a seed fails validation.
pub use casync_domain::InvalidSeedAction;

pub struct AssemblyOptions {
    pub worker_count: usize,
    pub skip_verify: bool,
    pub invalid_seed_action: InvalidSeedAction,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            skip_verify: false,
            invalid_seed_action: InvalidSeedAction::Skip,
        }
    }
}

/// Creates `target_path` if it doesn't exist, then resizes it to the
/// index's total length. Deliberately does not truncate an existing file
/// before resizing: extracting onto a complete or partially-matching file
/// depends on a
/// pre-existing target's bytes surviving this call so the in-place and
/// damaged-file repair steps have something to check against. `set_len`
/// zero-extends a file that's too short and drops trailing bytes from one
/// that's too long, which is exactly what's needed either way.
pub async fn prepare_target(target_path: &Path, total_length: u64) -> Result<(), CasyncError> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(target_path)
        .await
        .map_err(|e| CasyncError::Io(format!("creating target {}: {e}", target_path.display())))?;
    file.set_len(total_length)
        .await
        .map_err(|e| CasyncError::Io(format!("sizing target {}: {e}", target_path.display())))?;
    Ok(())
}

/// Reconstructs `target_path` from `index`, consulting `seeds` in order
/// before falling back to `store`. Returns accumulated [`ExtractStats`].
pub async fn assemble(
    index: &Index,
    target_path: &Path,
    store: Arc<dyn Store>,
    mut seeds: Vec<Arc<dyn Seed>>,
    converter: Arc<dyn Converter>,
    options: AssemblyOptions,
) -> Result<ExtractStats, CasyncError> {
    for slot in seeds.iter_mut() {
        if let Err(e) = slot.validate().await {
            match options.invalid_seed_action {
                InvalidSeedAction::BailOut => return Err(e),
                InvalidSeedAction::Skip => {
                    tracing::warn!(seed = %slot.path().display(), error = %e, "seed failed validation, skipping");
                }
                InvalidSeedAction::Regenerate => {
                    tracing::warn!(seed = %slot.path().display(), error = %e, "seed failed validation, regenerating index");
                    match regenerate_seed(slot.path(), index.params).await {
                        Ok(fresh) => *slot = fresh,
                        Err(regen_err) => {
                            tracing::warn!(
                                seed = %slot.path().display(),
                                error = %regen_err,
                                "seed regeneration failed, skipping"
                            );
                        }
                    }
                }
            }
        }
    }

    prepare_target(target_path, index.total_length()).await?;

    let stats = Arc::new(ExtractStats::new());
    let null_chunk = Arc::new(NullChunk::new(index.params.max_size));
    let self_seed = Arc::new(SelfSeed::new(target_path));
    let self_seed_dyn: Arc<dyn Seed> = self_seed.clone();
    let target_file = Arc::new(
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(target_path)
            .map_err(|e| CasyncError::Io(e.to_string()))?,
    );

    let jobs: Vec<casync_domain::IndexChunk> = index.iter().copied().collect();
    let cursor = Arc::new(AtomicUsize::new(0));
    let first_error: Arc<AsyncMutex<Option<CasyncError>>> = Arc::new(AsyncMutex::new(None));
    let worker_count = options.worker_count.max(1);
    let skip_verify = options.skip_verify;

    let mut join_set = tokio::task::JoinSet::new();
    for _ in 0..worker_count {
        let jobs = jobs.clone();
        let cursor = cursor.clone();
        let stats = stats.clone();
        let null_chunk = null_chunk.clone();
        let self_seed = self_seed.clone();
        let self_seed_dyn = self_seed_dyn.clone();
        let seeds = seeds.clone();
        let store = store.clone();
        let converter = converter.clone();
        let target_file = target_file.clone();
        let target_path = target_path.to_path_buf();
        let first_error = first_error.clone();

        join_set.spawn(async move {
            loop {
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                if idx >= jobs.len() {
                    break;
                }
                if first_error.lock().await.is_some() {
                    break;
                }

                let job = jobs[idx];
                let result = assemble_one_chunk(
                    &job,
                    &target_file,
                    &target_path,
                    &null_chunk,
                    &self_seed,
                    &self_seed_dyn,
                    &seeds,
                    &*store,
                    &*converter,
                    skip_verify,
                    &stats,
                )
                .await;

                if let Err(e) = result {
                    let mut slot = first_error.lock().await;
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    break;
                }
            }
        });
    }

    while join_set.join_next().await.is_some() {}

    if let Some(err) = first_error.lock().await.take() {
        return Err(err);
    }

    Ok(Arc::try_unwrap(stats).unwrap_or_else(|arc| ExtractStats {
        chunks_in_place: std::sync::atomic::AtomicU64::new(arc.chunks_in_place()),
        chunks_from_seeds: std::sync::atomic::AtomicU64::new(arc.chunks_from_seeds()),
        chunks_from_store: std::sync::atomic::AtomicU64::new(arc.chunks_from_store()),
        bytes_copied: std::sync::atomic::AtomicU64::new(arc.bytes_copied()),
        bytes_cloned: std::sync::atomic::AtomicU64::new(arc.bytes_cloned()),
    }))
}

#[allow(clippy::too_many_arguments)]
async fn assemble_one_chunk(
    job: &casync_domain::IndexChunk,
    target_file: &std::fs::File,
    target_path: &Path,
    null_chunk: &NullChunk,
    self_seed: &SelfSeed,
    self_seed_dyn: &Arc<dyn Seed>,
    seeds: &[Arc<dyn Seed>],
    store: &dyn Store,
    converter: &dyn Converter,
    skip_verify: bool,
    stats: &ExtractStats,
) -> Result<(), CasyncError> {
    let mut _state = ChunkJobState::Claimed;

    // Step 1: in-place check.
    if check_in_place(target_file, job, skip_verify)? {
        stats.record_in_place();
        self_seed.mark_written(job.id, casync_domain::SeedLocation { offset: job.start, size: job.size });
        _state = ChunkJobState::InPlace;
        return Ok(());
    }

    // Step 2: null-chunk hole-punch. The target may already read as zero
    // here (a freshly sparse-created file), but it may also hold stale or
    // damaged bytes (e.g. a file being repaired in place), so the hole is
    // punched unconditionally rather than assumed.
    if job.id == null_chunk.id() {
        punch_hole(target_file, job.start, job.size)?;
        stats.record_null_chunk(job.size);
        self_seed.mark_written(job.id, casync_domain::SeedLocation { offset: job.start, size: job.size });
        _state = ChunkJobState::Cloned;
        return Ok(());
    }

    // Step 3/4: seed-clone or seed-copy, self-seed first since it costs
    // nothing to check and may already hold this chunk from earlier in the
    // same run.
    for seed in std::iter::once(self_seed_dyn).chain(seeds.iter()) {
        if let Some(location) = seed.lookup(job.id).await {
            copy_from_seed(seed.as_ref(), location, target_file, target_path, job, stats)?;
            self_seed.mark_written(job.id, casync_domain::SeedLocation { offset: job.start, size: job.size });
            _state = ChunkJobState::Copied;
            return Ok(());
        }
    }

    // Step 5: store-fetch.
    let chunk: Chunk = store.get(job.id).await?;
    let uncompressed = chunk.materialize_uncompressed(|storage| converter.from_storage(storage))?;
    if uncompressed.len() as u64 != job.size {
        return Err(CasyncError::chunk_invalid(job.id));
    }
    target_file
        .write_at(uncompressed, job.start)
        .map_err(|e| CasyncError::Io(format!("writing chunk at offset {}: {e}", job.start)))?;
    stats.record_from_store(job.size);
    self_seed.mark_written(job.id, casync_domain::SeedLocation { offset: job.start, size: job.size });
    _state = ChunkJobState::Fetched;
    Ok(())
}

/// Re-chunks a seed file in place under `params` and returns a fresh
/// [`IndexSeed`] built from the result, for [`InvalidSeedAction::Regenerate`].
async fn regenerate_seed(path: &Path, params: casync_domain::ChunkerParams) -> Result<Arc<dyn Seed>, CasyncError> {
    let path_buf = path.to_path_buf();
    let index = tokio::task::spawn_blocking(move || -> Result<Index, CasyncError> {
        let file = std::fs::File::open(&path_buf)
            .map_err(|e| CasyncError::Io(format!("opening seed {}: {e}", path_buf.display())))?;
        let mut chunks = Vec::new();
        for record in crate::application::services::chunker::Chunker::new(file, params) {
            let record = record?;
            chunks.push(casync_domain::IndexChunk {
                start: record.start,
                size: record.size(),
                id: record.id,
            });
        }
        Index::new(params, chunks)
    })
    .await
    .map_err(|e| CasyncError::internal(format!("seed regeneration task panicked: {e}")))??;

    Ok(Arc::new(IndexSeed::new(path, &index)))
}

fn check_in_place(target_file: &std::fs::File, job: &casync_domain::IndexChunk, skip_verify: bool) -> Result<bool, CasyncError> {
    if skip_verify {
        return Ok(false);
    }
    let mut buf = vec![0u8; job.size as usize];
    match target_file.read_at(&mut buf, job.start) {
        Ok(n) if n == buf.len() => Ok(ChunkId::compute(&buf) == job.id),
        _ => Ok(false),
    }
}

/// Punches a hole over `[offset, offset + len)`, falling back to an
/// explicit zero-write when the filesystem doesn't support
/// `FALLOC_FL_PUNCH_HOLE` (e.g. tmpfs on some kernels, or a non-Linux
/// target).
fn punch_hole(target_file: &std::fs::File, offset: u64, len: u64) -> Result<(), CasyncError> {
    #[cfg(target_os = "linux")]
    {
        let ret = unsafe {
            libc::fallocate(
                target_file.as_raw_fd(),
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret == 0 {
            return Ok(());
        }
    }
    zero_fill(target_file, offset, len)
}

fn zero_fill(target_file: &std::fs::File, offset: u64, len: u64) -> Result<(), CasyncError> {
    let zeros = vec![0u8; len as usize];
    target_file
        .write_at(&zeros, offset)
        .map_err(|e| CasyncError::Io(format!("zero-filling offset {offset}: {e}")))?;
    Ok(())
}

/// Copies `location.size` bytes from `seed`'s backing file into `target_file`
/// at `job.start`. When the seed shares `target_path`'s filesystem, clones
/// the block-aligned middle of the range via `copy_file_range` and falls
/// back to a buffered read/write for the unaligned head and tail;
/// off-filesystem or when cloning fails outright, the whole range is
/// copied the same buffered way.
fn copy_from_seed(
    seed: &dyn Seed,
    location: casync_domain::SeedLocation,
    target_file: &std::fs::File,
    target_path: &Path,
    job: &casync_domain::IndexChunk,
    stats: &ExtractStats,
) -> Result<(), CasyncError> {
    let seed_file = std::fs::File::open(seed.path()).map_err(|e| CasyncError::Io(e.to_string()))?;
    let len = job.size;

    let (head_len, cloned_len) = if seed.same_filesystem(target_path) {
        clone_aligned_middle(&seed_file, location.offset, target_file, job.start, len).unwrap_or((0, 0))
    } else {
        (0, 0)
    };

    let covered = head_len + cloned_len;
    if covered < len {
        if head_len > 0 {
            copy_range_buffered(&seed_file, location.offset, target_file, job.start, head_len, seed.path())?;
        }
        let tail_len = len - covered;
        if tail_len > 0 {
            copy_range_buffered(
                &seed_file,
                location.offset + covered,
                target_file,
                job.start + covered,
                tail_len,
                seed.path(),
            )?;
        }
    }

    stats.record_from_seed(len - cloned_len, cloned_len);
    Ok(())
}

fn copy_range_buffered(
    seed_file: &std::fs::File,
    seed_offset: u64,
    target_file: &std::fs::File,
    target_offset: u64,
    len: u64,
    seed_path: &Path,
) -> Result<(), CasyncError> {
    let mut buf = vec![0u8; len as usize];
    seed_file
        .read_at(&mut buf, seed_offset)
        .map_err(|e| CasyncError::Io(format!("reading seed {}: {e}", seed_path.display())))?;
    target_file
        .write_at(&buf, target_offset)
        .map_err(|e| CasyncError::Io(format!("writing chunk at offset {target_offset}: {e}")))?;
    Ok(())
}

/// Clones the largest block-aligned middle subrange of `[seed_offset,
/// seed_offset + len)` via `copy_file_range`, returning `(head_len,
/// cloned_len)`: the unaligned byte count at the start of the range the
/// caller still needs to copy, and the number of bytes actually cloned.
/// The tail, if any, is `len - head_len - cloned_len`.
#[cfg(target_os = "linux")]
fn clone_aligned_middle(
    seed_file: &std::fs::File,
    seed_offset: u64,
    target_file: &std::fs::File,
    target_offset: u64,
    len: u64,
) -> std::io::Result<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;

    let blksize = seed_file.metadata()?.blksize().max(1);
    let aligned_seed_start = seed_offset.div_ceil(blksize) * blksize;
    let head = (aligned_seed_start - seed_offset).min(len);
    let aligned_len = ((len - head) / blksize) * blksize;
    if aligned_len == 0 {
        return Ok((head, 0));
    }

    let mut off_in = (seed_offset + head) as libc::off_t;
    let mut off_out = (target_offset + head) as libc::off_t;
    let mut remaining = aligned_len;
    let mut cloned = 0u64;
    while remaining > 0 {
        let n = unsafe {
            libc::copy_file_range(
                seed_file.as_raw_fd(),
                &mut off_in,
                target_file.as_raw_fd(),
                &mut off_out,
                remaining as usize,
                0,
            )
        };
        if n < 0 {
            if cloned == 0 {
                return Err(std::io::Error::last_os_error());
            }
            break;
        }
        if n == 0 {
            break;
        }
        remaining -= n as u64;
        cloned += n as u64;
    }
    Ok((head, cloned))
}

#[cfg(not(target_os = "linux"))]
fn clone_aligned_middle(
    _seed_file: &std::fs::File,
    _seed_offset: u64,
    _target_file: &std::fs::File,
    _target_offset: u64,
    _len: u64,
) -> std::io::Result<(u64, u64)> {
    Ok((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::converter_chain::ConverterChain;
    use crate::infrastructure::adapters::converters::ZstdCompressor;
    use crate::infrastructure::adapters::stores::LocalStore;
    use casync_domain::{ChunkerParams, IndexChunk, WriteStore};
    use tempfile::tempdir;

    #[tokio::test]
    async fn assembles_file_purely_from_store() {
        let dir = tempdir().unwrap();
        let converter: Arc<dyn Converter> = Arc::new(ConverterChain::new(vec![Arc::new(ZstdCompressor::default())]));
        let store_dir = tempdir().unwrap();
        let store = LocalStore::new(store_dir.path(), converter.extension());

        let params = ChunkerParams::new(0, 4, 4, 4).unwrap();
        let chunk_a = b"AAAA".to_vec();
        let chunk_b = b"BBBB".to_vec();
        let id_a = ChunkId::compute(&chunk_a);
        let id_b = ChunkId::compute(&chunk_b);

        store.store(id_a, converter.to_storage(&chunk_a).unwrap()).await.unwrap();
        store.store(id_b, converter.to_storage(&chunk_b).unwrap()).await.unwrap();

        let index = Index::new(
            params,
            vec![
                IndexChunk { start: 0, size: 4, id: id_a },
                IndexChunk { start: 4, size: 4, id: id_b },
            ],
        )
        .unwrap();

        let target_path = dir.path().join("target.bin");
        let stats = assemble(
            &index,
            &target_path,
            Arc::new(store),
            vec![],
            converter,
            AssemblyOptions::default(),
        )
        .await
        .unwrap();

        let written = std::fs::read(&target_path).unwrap();
        assert_eq!(written, b"AAAABBBB");
        assert_eq!(stats.chunks_from_store(), 2);
    }

    #[tokio::test]
    async fn reuses_chunk_already_in_place() {
        let dir = tempdir().unwrap();
        let converter: Arc<dyn Converter> = Arc::new(ConverterChain::empty());
        let store_dir = tempdir().unwrap();
        let store = LocalStore::new(store_dir.path(), "");

        let params = ChunkerParams::new(0, 4, 4, 4).unwrap();
        let chunk_a = b"AAAA".to_vec();
        let id_a = ChunkId::compute(&chunk_a);
        let index = Index::new(params, vec![IndexChunk { start: 0, size: 4, id: id_a }]).unwrap();

        let target_path = dir.path().join("target.bin");
        tokio::fs::write(&target_path, b"AAAA").await.unwrap();

        let stats = assemble(
            &index,
            &target_path,
            Arc::new(store),
            vec![],
            converter,
            AssemblyOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(stats.chunks_in_place(), 1);
        assert_eq!(stats.chunks_from_store(), 0);
    }
}
