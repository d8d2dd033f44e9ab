// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # casync
//!
//! A casync-compatible content-addressed chunk store and synchronizer:
//! content-defined chunking over a rolling hash, a SHA-512/256 chunk store
//! with pluggable compression and encryption converters, and an assembly
//! engine that reconstructs a target file from seeds before falling back to
//! the store.
//!
//! ## Architecture
//!
//! The crate follows the same layering as its sibling `casync-domain` and
//! `casync-bootstrap` crates:
//!
//! - [`application`] — orchestrates the domain's ports into the `chunk` and
//!   `assemble` workflows the binary exposes: the chunker, the chunk-storage
//!   pipeline, seed management, and the assembly engine.
//! - [`infrastructure`] — concrete adapters the application layer depends on
//!   through `casync-domain`'s traits: store implementations (local,
//!   router, cache, failover, rate-limited, dedup queue), converters
//!   (zstd, AES-GCM, XChaCha20-Poly1305, AES-CTR), the binary index codec,
//!   the chunk-server wire protocol, and runtime configuration.
//!
//! Domain types ([`casync_domain::Chunk`], [`casync_domain::ChunkId`],
//! [`casync_domain::Index`], ...) and ports ([`casync_domain::Store`],
//! [`casync_domain::Converter`], [`casync_domain::Seed`]) live in
//! `casync-domain` and are re-exported here for convenience.

pub mod application;
pub mod infrastructure;

pub use casync_domain::{
    CasyncError, Chunk, ChunkId, ChunkJobState, ChunkerParams, Converter, ExtractStats, Index, IndexChunk,
    InvalidSeedAction, NullChunk, Seed, SeedLocation, Store, StoreOptions, WriteStore, CHUNK_ID_LEN, DEFAULT_AVG_SIZE,
    DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE,
};

pub use crate::application::services::{AsyncChunker, ChunkRecord, Chunker, ConverterChain};
pub use crate::infrastructure::config::CasyncConfig;
