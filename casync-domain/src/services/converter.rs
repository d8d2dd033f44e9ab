// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Converter Port
//!
//! A [`Converter`] is a reversible byte transform applied between a chunk's
//! uncompressed bytes and its on-storage bytes: compression, then zero or
//! more layers of encryption. This trait is the domain contract; concrete
//! converters (zstd, XChaCha20-Poly1305, AES-256-GCM, AES-256-CTR) live in
//! `casync::infrastructure::adapters::converters` because they depend on
//! specific third-party crates the domain has no business knowing about.
//!
//! ## Architecture Note
//!
//! Conversion is CPU-bound, not I/O-bound, so this trait stays
//! synchronous:
//! there is no async adapter analogous to `AsyncCompressionAdapter` — chains
//! are applied inline inside the (already-async) chunk-storage pipeline and
//! assembly engine worker tasks via `spawn_blocking` when the data is large
//! enough to matter.

use crate::error::CasyncError;

/// A single reversible transform in the converter chain.
///
/// Implementations must be thread-safe and stateless with respect to the
/// data they convert (any internal state, such as a derived key, is fixed
/// at construction time).
pub trait Converter: Send + Sync {
    /// Applies this converter's forward transform (e.g. compress, then
    /// encrypt) when writing a chunk to storage.
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError>;

    /// Applies this converter's inverse transform when reading a chunk back
    /// from storage.
    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError>;

    /// Whether `other` is configured identically to `self` (same algorithm,
    /// same derived key). Used to detect when two stores/seeds already
    /// agree on a converter chain and a re-conversion can be skipped.
    fn equal(&self, other: &dyn Converter) -> bool;

    /// The fragment this converter contributes to a chunk-file's storage
    /// extension, e.g. `.cacnk` for the compressor or
    /// `.aes-256-gcm-a1b2c3d4` for an AEAD converter keyed by a passphrase
    /// (the trailing hex is a short handle derived from the key, per spec
    /// §4.3, so two converters derived from the same passphrase agree on
    /// the same handle without exchanging key material).
    fn extension(&self) -> String;
}
