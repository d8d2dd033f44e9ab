// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios exercising the chunk-and-store pipeline and the
//! assembly engine together against a real on-disk store, rather than unit
//! tests of either in isolation.

use casync::application::services::assembly::{assemble, prepare_target, AssemblyOptions};
use casync::application::services::chunk_storage_pipeline::chunk_and_store;
use casync::application::services::seed_management::IndexSeed;
use casync::infrastructure::adapters::converters::ZstdCompressor;
use casync::infrastructure::adapters::stores::{FailoverGroup, LocalStore, RateLimitMode, RateLimitedStore};
use casync::infrastructure::protocol::{self, Capabilities, Message};
use casync::{CasyncError, ChunkId, ChunkerParams, ConverterChain, Store, WriteStore};
use casync_bootstrap::shutdown::ShutdownCoordinator;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Deterministic, non-cryptographic byte generator so fixture content is
/// reproducible without pulling in a system RNG dependency for tests.
fn pseudo_random_block(len: usize, mut state: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push((state & 0xff) as u8);
    }
    out
}

async fn chunk_store_fixture(data: Vec<u8>, root: &Path, params: ChunkerParams) -> (casync::Index, Arc<LocalStore>, ConverterChain) {
    let chain = ConverterChain::new(vec![Arc::new(ZstdCompressor::default())]);
    let store = Arc::new(LocalStore::new(root, chain.extension()));
    let coordinator = ShutdownCoordinator::default();
    let (index, _stats) = chunk_and_store(
        Cursor::new(data),
        params,
        store.clone() as Arc<dyn WriteStore>,
        Arc::new(chain.clone()),
        4,
        8,
        coordinator.token(),
    )
    .await
    .unwrap();
    (index, store, chain)
}

fn small_params() -> ChunkerParams {
    ChunkerParams::new(0, 4 * 1024, 16 * 1024, 64 * 1024).unwrap()
}

/// S1 — extracting into a brand new target file reproduces the input
/// exactly and never finds anything already in place.
#[tokio::test]
async fn extract_to_new_file_reproduces_input() {
    let dir = tempdir().unwrap();
    let block = pseudo_random_block(128 * 1024, 0xC0FFEE);
    let mut data = block.repeat(16);
    data.extend(std::iter::repeat(0u8).take(32 * 1024));

    let (index, store, chain) = chunk_store_fixture(data.clone(), &dir.path().join("store"), small_params()).await;

    // Round-trip the index through its binary codec, as a real caller
    // would persist it to a .caibx file between chopping and assembling.
    let mut encoded = Vec::new();
    casync::infrastructure::codec::index_codec::write_index(&mut encoded, &index).unwrap();
    let reloaded = casync::infrastructure::codec::index_codec::read_index(&mut Cursor::new(encoded)).unwrap();

    let target_path = dir.path().join("target.bin");
    let stats = assemble(
        &reloaded,
        &target_path,
        store as Arc<dyn Store>,
        Vec::new(),
        Arc::new(chain),
        AssemblyOptions::default(),
    )
    .await
    .unwrap();

    let assembled = std::fs::read(&target_path).unwrap();
    assert_eq!(assembled, data);
    assert_eq!(stats.chunks_in_place(), 0);
}

/// S2 — a target that already holds the correct bytes needs nothing from
/// the store at all.
#[tokio::test]
async fn extract_to_already_complete_file_touches_no_store() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_block(256 * 1024, 0xBEEF);
    let (index, _store, chain) = chunk_store_fixture(data.clone(), &dir.path().join("store"), small_params()).await;

    let target_path = dir.path().join("target.bin");
    std::fs::write(&target_path, &data).unwrap();

    let empty_store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path().join("empty_store"), chain.extension()));

    let stats = assemble(&index, &target_path, empty_store, Vec::new(), Arc::new(chain), AssemblyOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.chunks_from_store(), 0);
    assert_eq!(stats.chunks_in_place(), index.len() as u64);
    assert_eq!(std::fs::read(&target_path).unwrap(), data);
}

/// S3 — a target with its first and last bytes flipped and one stray byte
/// appended is repaired back to the original, truncating the extra byte.
#[tokio::test]
async fn extract_to_damaged_file_repairs_only_the_damaged_chunks() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_block(256 * 1024, 0x5EED);
    let (index, store, chain) = chunk_store_fixture(data.clone(), &dir.path().join("store"), small_params()).await;

    let mut damaged = data.clone();
    damaged[0] ^= 0xff;
    let last = damaged.len() - 1;
    damaged[last] ^= 0xff;
    damaged.push(0);

    let target_path = dir.path().join("target.bin");
    std::fs::write(&target_path, &damaged).unwrap();

    let stats = assemble(
        &index,
        &target_path,
        store as Arc<dyn Store>,
        Vec::new(),
        Arc::new(chain),
        AssemblyOptions::default(),
    )
    .await
    .unwrap();

    let repaired = std::fs::read(&target_path).unwrap();
    assert_eq!(repaired, data);
    assert!(stats.chunks_from_store() >= 1);
    assert!(stats.chunks_in_place() >= 1);
}

/// S4 — seeded extract: two seed files share some of the target's chunks
/// (including the canonical null chunk), so assembly should pull the
/// non-null shared chunk from a seed instead of the store, and only the
/// chunk absent from both seeds goes to the store.
#[tokio::test]
async fn seeded_extract_prefers_seed_bytes_over_the_store() {
    const CHUNK_SIZE: u64 = 16;
    let params = ChunkerParams::new(0, CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE).unwrap();

    let data1 = vec![0xAAu8; CHUNK_SIZE as usize];
    let null = vec![0x00u8; CHUNK_SIZE as usize];
    let rand1 = vec![0xBBu8; CHUNK_SIZE as usize];
    let rand2 = vec![0xCCu8; CHUNK_SIZE as usize];

    let layout_to_index = |layout: &[&[u8]]| -> (Vec<u8>, casync::Index) {
        let mut bytes = Vec::new();
        let mut chunks = Vec::new();
        for piece in layout {
            let start = bytes.len() as u64;
            bytes.extend_from_slice(piece);
            chunks.push(casync::IndexChunk {
                start,
                size: piece.len() as u64,
                id: ChunkId::compute(piece),
            });
        }
        (bytes.clone(), casync::Index::new(params, chunks).unwrap())
    };

    let (target_bytes, target_index) = layout_to_index(&[&data1, &null, &null, &rand1, &null]);
    let (seed1_bytes, seed1_index) = layout_to_index(&[&rand2, &null, &rand2, &rand2, &data1]);
    let (seed2_bytes, seed2_index) = layout_to_index(&[&data1, &null, &rand2, &rand2, &data1]);

    let dir = tempdir().unwrap();
    let seed1_path = dir.path().join("seed1.bin");
    let seed2_path = dir.path().join("seed2.bin");
    std::fs::write(&seed1_path, &seed1_bytes).unwrap();
    std::fs::write(&seed2_path, &seed2_bytes).unwrap();

    let chain = ConverterChain::empty();
    let store = LocalStore::new(dir.path().join("store"), chain.extension());
    // Only rand1's chunk lives in the store: neither seed has it, so
    // assembly must fall back to the store for exactly that chunk.
    store.store(ChunkId::compute(&rand1), rand1.clone()).await.unwrap();

    let seeds: Vec<Arc<dyn casync::Seed>> = vec![
        Arc::new(IndexSeed::new(&seed1_path, &seed1_index)),
        Arc::new(IndexSeed::new(&seed2_path, &seed2_index)),
    ];

    let target_path = dir.path().join("target.bin");
    let stats = assemble(
        &target_index,
        &target_path,
        Arc::new(store) as Arc<dyn Store>,
        seeds,
        Arc::new(chain),
        AssemblyOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(&target_path).unwrap(), target_bytes);
    assert_eq!(stats.chunks_from_store(), 1);
    assert!(stats.chunks_from_seeds() >= 1);
    assert!(stats.bytes_copied() > 0 || stats.bytes_cloned() > 0);
}

/// S5 — a client drives the HELLO/REQUEST/CHUNK/MISSING handshake against
/// an in-process mock server backed by a small chunk table.
#[tokio::test]
async fn protocol_round_trip_against_mock_server() {
    let known_id = ChunkId::compute(b"a chunk the server has");
    let unknown_id = ChunkId::compute(b"a chunk nobody has");
    let mut table = HashMap::new();
    table.insert(known_id, b"chunk payload".to_vec());

    let (mut client, mut server) = tokio::io::duplex(8 * 1024);

    let server_task = tokio::spawn(async move {
        let caps = protocol::server_handshake(&mut server).await.unwrap();
        assert!(caps.contains(Capabilities::PULL_CHUNKS));

        loop {
            match Message::read(&mut server).await.unwrap() {
                Message::Request { id, .. } => {
                    let reply = match table.get(&id) {
                        Some(data) => Message::Chunk {
                            flags: 0,
                            id,
                            data: data.clone(),
                        },
                        None => Message::Missing { flags: 0, id },
                    };
                    reply.write(&mut server).await.unwrap();
                }
                Message::Goodbye => break,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    });

    let caps = protocol::client_handshake(&mut client).await.unwrap();
    assert!(caps.contains(Capabilities::READABLE_STORE));

    let data = protocol::request_chunk(&mut client, known_id).await.unwrap();
    assert_eq!(data, b"chunk payload");

    let err = protocol::request_chunk(&mut client, unknown_id).await.unwrap_err();
    assert!(err.is_missing());
    assert!(matches!(err, CasyncError::ChunkMissing { .. }));

    Message::Goodbye.write(&mut client).await.unwrap();
    server_task.await.unwrap();
}

/// A replica that fails every other 10ms window; paired with a sibling on
/// the opposite parity, exactly one of the pair is ever down at a time.
struct ChurnReplica {
    inner: LocalStore,
    start: Instant,
    down_parity: u64,
}

impl ChurnReplica {
    fn is_down(&self) -> bool {
        let tick = self.start.elapsed().as_millis() as u64 / 10;
        tick % 2 == self.down_parity
    }
}

#[async_trait::async_trait]
impl Store for ChurnReplica {
    async fn get(&self, id: ChunkId) -> Result<casync::Chunk, CasyncError> {
        if self.is_down() {
            return Err(CasyncError::internal("replica unavailable"));
        }
        self.inner.get(id).await
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        if self.is_down() {
            return Err(CasyncError::internal("replica unavailable"));
        }
        self.inner.has(id).await
    }

    fn id(&self) -> &str {
        "churn-replica"
    }
}

/// S6 — failover under churn: two replicas alternate availability every
/// 10ms; 16 concurrent readers hammering the group for about a second
/// should never observe an error since one replica is always up.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failover_group_survives_alternating_replica_churn() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let id = ChunkId::compute(b"payload");

    let local_a = LocalStore::new(dir_a.path(), ".cacnk");
    local_a.store(id, b"bytes".to_vec()).await.unwrap();
    let local_b = LocalStore::new(dir_b.path(), ".cacnk");
    local_b.store(id, b"bytes".to_vec()).await.unwrap();

    let start = Instant::now();
    let replica_a = Arc::new(ChurnReplica { inner: local_a, start, down_parity: 0 });
    let replica_b = Arc::new(ChurnReplica { inner: local_b, start, down_parity: 1 });

    let group = Arc::new(FailoverGroup::new(
        "churn-group",
        vec![replica_a as Arc<dyn Store>, replica_b as Arc<dyn Store>],
    ));

    let error_count = Arc::new(AtomicU32::new(0));
    let deadline = Instant::now() + Duration::from_millis(900);

    let mut readers = Vec::new();
    for _ in 0..16 {
        let group = group.clone();
        let error_count = error_count.clone();
        readers.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                if group.get(id).await.is_err() {
                    error_count.fetch_add(1, Ordering::Relaxed);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }));
    }

    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(error_count.load(Ordering::Relaxed), 0);
}

/// Property: a rate-limited store admits only `burst` calls instantly and
/// then paces the rest at `rate` per second, so `n` sequential calls with
/// rate=10/s and burst=1 take at least `(n - 1) / rate` seconds.
#[tokio::test]
async fn rate_limited_store_paces_sequential_calls() {
    let dir = tempdir().unwrap();
    let id = ChunkId::compute(b"payload");
    let local = LocalStore::new(dir.path(), ".cacnk");
    local.store(id, b"bytes".to_vec()).await.unwrap();

    let limited = RateLimitedStore::new(
        "limited",
        Arc::new(local),
        10.0,
        1.0,
        RateLimitMode::Block { timeout: Some(Duration::from_secs(5)) },
    );

    let start = Instant::now();
    for _ in 0..10 {
        limited.has(id).await.unwrap();
    }
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(850), "expected pacing to take >= ~0.9s, took {elapsed:?}");
}

/// Property: prepare_target must not clobber an already-correct file, and
/// assembling over it with a blank store should need zero gets.
#[tokio::test]
async fn idempotent_assemble_over_already_correct_target_makes_no_store_calls() {
    let dir = tempdir().unwrap();
    let data = pseudo_random_block(64 * 1024, 0x1234);
    let (index, _store, chain) = chunk_store_fixture(data.clone(), &dir.path().join("store"), small_params()).await;

    let target_path = dir.path().join("target.bin");
    prepare_target(&target_path, index.total_length()).await.unwrap();
    std::fs::write(&target_path, &data).unwrap();

    /// A store that panics if ever consulted, proving assembly never calls
    /// through to it when the target is already byte-for-byte correct.
    struct PanicsIfCalled;
    #[async_trait::async_trait]
    impl Store for PanicsIfCalled {
        async fn get(&self, _id: ChunkId) -> Result<casync::Chunk, CasyncError> {
            panic!("store should not have been consulted");
        }
        async fn has(&self, _id: ChunkId) -> Result<bool, CasyncError> {
            panic!("store should not have been consulted");
        }
        fn id(&self) -> &str {
            "panics-if-called"
        }
    }

    let stats = assemble(
        &index,
        &target_path,
        Arc::new(PanicsIfCalled) as Arc<dyn Store>,
        Vec::new(),
        Arc::new(chain),
        AssemblyOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(stats.chunks_from_store(), 0);
    assert_eq!(stats.chunks_in_place(), index.len() as u64);
}
