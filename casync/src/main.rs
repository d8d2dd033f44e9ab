// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # casync CLI
//!
//! Thin entry point: bootstrap (argument parsing, signal handling,
//! configuration loading, logging) lives in `casync-bootstrap`; this binary
//! wires its validated output into the `chunk`/`assemble` application
//! services and maps the result to a process exit code.

use casync::application::services::assembly::{self, AssemblyOptions};
use casync::application::services::chunk_storage_pipeline;
use casync::application::services::seed_management::IndexSeed;
use casync::application::services::{Chunker, ConverterChain};
use casync::infrastructure::adapters::converters::{Aes256CtrConverter, Aes256GcmConverter, XChaChaConverter, ZstdCompressor};
use casync::infrastructure::adapters::stores::LocalStore;
use casync::infrastructure::codec::index_codec;
use casync::infrastructure::config::CasyncConfig;
use casync_bootstrap::shutdown::{CancellationToken, ShutdownCoordinator};
use casync_bootstrap::signals::install_shutdown_handler;
use casync_bootstrap::{bootstrap_cli, result_to_exit_code, ValidatedCommand};
use casync_domain::{CasyncError, ChunkerParams, Converter, Index, Seed, Store, WriteStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn main() -> std::process::ExitCode {
    let cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("casync: {e}");
            return casync_bootstrap::ExitCode::Usage.into();
        }
    };

    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("casync: failed to start async runtime: {e}");
            return casync_bootstrap::ExitCode::GeneralError.into();
        }
    };

    let result = runtime.block_on(run(cli));
    result_to_exit_code(result)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: casync_bootstrap::ValidatedCli) -> Result<(), CasyncError> {
    let config = CasyncConfig::load(cli.config.as_deref())?;

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(10));
    install_shutdown_handler(coordinator.clone());
    let cancel = coordinator.token();

    let worker_count = cli.concurrency.unwrap_or(config.store.worker_count);

    match cli.command {
        ValidatedCommand::Chunk {
            input,
            store,
            index,
            min_size,
            avg_size,
            max_size,
            converters,
        } => run_chunk(&input, &store, &index, min_size, avg_size, max_size, &converters, &config, worker_count, cli.channel_depth, cancel).await,
        ValidatedCommand::Assemble {
            index,
            store,
            target,
            seeds,
            converters,
            skip_verify,
        } => run_assemble(&index, &store, &target, &seeds, &converters, &config, worker_count, skip_verify).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_chunk(
    input: &Path,
    store_path: &str,
    index_path: &Path,
    min_size: Option<u64>,
    avg_size: Option<u64>,
    max_size: Option<u64>,
    converter_names: &[String],
    config: &CasyncConfig,
    worker_count: usize,
    channel_depth: usize,
    cancel: CancellationToken,
) -> Result<(), CasyncError> {
    let params = ChunkerParams::new(
        config.chunker.feature_flags,
        min_size.unwrap_or(config.chunker.min_size),
        avg_size.unwrap_or(config.chunker.avg_size),
        max_size.unwrap_or(config.chunker.max_size),
    )?;

    let store: Arc<dyn WriteStore> = Arc::new(LocalStore::new(store_path, ".cacnk"));
    let converter = build_converter_chain(converter_names, config)?;

    let source = std::fs::File::open(input).map_err(|e| CasyncError::Io(format!("opening {}: {e}", input.display())))?;

    let (built_index, stats) = chunk_storage_pipeline::chunk_and_store(source, params, store, converter, worker_count, channel_depth, cancel).await?;

    let mut out = std::fs::File::create(index_path).map_err(|e| CasyncError::Io(format!("creating {}: {e}", index_path.display())))?;
    index_codec::write_index(&mut out, &built_index)?;

    tracing::info!(
        chunks_stored = stats.chunks_stored.load(std::sync::atomic::Ordering::Relaxed),
        chunks_deduped_memo = stats.chunks_deduped_memo.load(std::sync::atomic::Ordering::Relaxed),
        chunks_already_in_store = stats.chunks_already_in_store.load(std::sync::atomic::Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(std::sync::atomic::Ordering::Relaxed),
        "chunking complete"
    );
    Ok(())
}

async fn run_assemble(
    index_path: &Path,
    store_path: &str,
    target: &Path,
    seed_paths: &[std::path::PathBuf],
    converter_names: &[String],
    config: &CasyncConfig,
    worker_count: usize,
    skip_verify: bool,
) -> Result<(), CasyncError> {
    let mut index_file =
        std::fs::File::open(index_path).map_err(|e| CasyncError::Io(format!("opening {}: {e}", index_path.display())))?;
    let index = index_codec::read_index(&mut index_file)?;

    let store: Arc<dyn Store> = Arc::new(LocalStore::new(store_path, ".cacnk"));
    let converter = build_converter_chain(converter_names, config)?;

    let mut seeds: Vec<Arc<dyn Seed>> = Vec::with_capacity(seed_paths.len());
    for seed_path in seed_paths {
        let seed_index = chunk_seed_file(seed_path, index.params).await?;
        seeds.push(Arc::new(IndexSeed::new(seed_path.clone(), &seed_index)));
    }

    let options = AssemblyOptions {
        worker_count,
        skip_verify,
        ..AssemblyOptions::default()
    };

    let stats = assembly::assemble(&index, target, store, seeds, converter, options).await?;

    tracing::info!(
        chunks_in_place = stats.chunks_in_place(),
        chunks_from_seeds = stats.chunks_from_seeds(),
        chunks_from_store = stats.chunks_from_store(),
        bytes_copied = stats.bytes_copied(),
        bytes_cloned = stats.bytes_cloned(),
        "assembly complete"
    );
    Ok(())
}

/// Chunks a seed file under the target index's params so its bytes can be
/// looked up by chunk id during assembly — seeds are matched by content,
/// not by a stored index alongside them.
async fn chunk_seed_file(path: &Path, params: ChunkerParams) -> Result<Index, CasyncError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Index, CasyncError> {
        let file = std::fs::File::open(&path).map_err(|e| CasyncError::Io(format!("opening seed {}: {e}", path.display())))?;
        let mut chunks = Vec::new();
        for record in Chunker::new(file, params) {
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
    .map_err(|e| CasyncError::internal(format!("seed chunking task panicked: {e}")))?
}

/// Builds a [`ConverterChain`] from CLI-provided converter names, in order.
/// Encryption converters draw their key material from `config.crypto`.
fn build_converter_chain(names: &[String], config: &CasyncConfig) -> Result<Arc<dyn Converter>, CasyncError> {
    let mut links: Vec<Arc<dyn Converter>> = Vec::with_capacity(names.len());
    for name in names {
        let converter: Arc<dyn Converter> = match name.as_str() {
            "zstd" => Arc::new(ZstdCompressor::new(3)),
            "xchacha20poly1305" => Arc::new(XChaChaConverter::new(&require_passphrase(config)?, key_salt(config))?),
            "aes256gcm" => Arc::new(Aes256GcmConverter::new(&require_passphrase(config)?, key_salt(config))?),
            "aes256ctr" => Arc::new(Aes256CtrConverter::new(derive_raw_key(config)?)),
            other => return Err(CasyncError::InvalidConfiguration(format!("unknown converter '{other}'"))),
        };
        links.push(converter);
    }
    Ok(Arc::new(ConverterChain::new(links)))
}

fn require_passphrase(config: &CasyncConfig) -> Result<String, CasyncError> {
    config
        .crypto
        .passphrase
        .clone()
        .ok_or_else(|| CasyncError::InvalidConfiguration("encryption converter requested but no passphrase configured (set CASYNC__CRYPTO__PASSPHRASE)".into()))
}

fn key_salt(config: &CasyncConfig) -> &[u8] {
    config.crypto.key_handle.as_deref().unwrap_or("casync").as_bytes()
}

/// Derives a raw 32-byte key for [`Aes256CtrConverter`], which (unlike the
/// AEAD converters) takes key bytes directly rather than deriving them
/// itself, using the same Argon2-over-base64-salt scheme as `aead.rs`'s
/// private `derive_key` so a passphrase produces the same key material
/// regardless of which converter consumes it.
fn derive_raw_key(config: &CasyncConfig) -> Result<[u8; 32], CasyncError> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let passphrase = require_passphrase(config)?;
    let salt_string =
        SaltString::encode_b64(key_salt(config)).map_err(|e| CasyncError::InvalidConfiguration(format!("invalid salt: {e}")))?;
    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt_string)
        .map_err(|e| CasyncError::InvalidConfiguration(format!("argon2 key derivation failed: {e}")))?;
    let hash_bytes = hash.hash.ok_or_else(|| CasyncError::internal("argon2 produced no hash output"))?;
    let raw = hash_bytes.as_bytes();
    if raw.len() < 32 {
        return Err(CasyncError::internal("derived key material too short"));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&raw[..32]);
    Ok(key)
}
