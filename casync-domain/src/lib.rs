// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # casync Domain
//!
//! The domain layer of the casync-compatible chunk store and synchronizer:
//! pure business logic, value objects and port traits, independent of any
//! concrete converter, store transport, or async runtime. It implements
//! Domain-Driven Design patterns, keeping value objects, port traits, and
//! errors free of any infrastructure concern.
//!
//! ## Module Structure
//!
//! ### Value Objects
//! - [`ChunkId`] — the SHA-512/256 content identity of a chunk
//! - [`Chunk`] — the lazily-materialised uncompressed/storage pair
//! - [`ChunkerParams`] — validated `(min, avg, max)` chunker sizing
//! - [`Index`] / [`IndexChunk`] — the ordered manifest of a logical blob
//! - [`StoreOptions`] — the superset of knobs a concrete store may consult
//! - [`ExtractStats`] — atomic chunk-provenance counters for assembly
//!
//! ### Domain Services (port traits)
//! - [`Store`] / [`WriteStore`] — the content-addressed key/value contract
//! - [`Converter`] — a reversible byte transform (compression, encryption)
//! - [`Seed`] — an auxiliary source of chunk bytes
//!
//! ### Errors
//! - [`CasyncError`] — the single error enum shared across every layer

pub mod error;
pub mod services;
pub mod value_objects;

pub use error::CasyncError;
pub use services::{Converter, InvalidSeedAction, Seed, SeedLocation, Store, WriteStore};
pub use value_objects::{
    Chunk, ChunkId, ChunkJobState, ChunkerParams, ExtractStats, Index, IndexChunk, NullChunk, StoreOptions,
    CHUNK_ID_LEN, DEFAULT_AVG_SIZE, DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE,
};
