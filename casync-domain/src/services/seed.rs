// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Seed Port
//!
//! A [`Seed`] is an auxiliary source of chunk bytes the assembly engine can
//! consult before falling back to the `Store`: either another file already
//! on disk (`IndexSeed`, in `casync::application::services::seed_management`)
//! or the in-progress target file itself (`SelfSeed`). Both concrete types
//! implement this one trait so the assembly engine's decision procedure
//! does not need to special-case self-seeding.

use crate::error::CasyncError;
use crate::value_objects::ChunkId;
use async_trait::async_trait;
use std::path::Path;

/// A location within a seed's backing file where a chunk's bytes can be
/// found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedLocation {
    pub offset: u64,
    pub size: u64,
}

#[async_trait]
pub trait Seed: Send + Sync {
    /// Maps a chunk id to a location in this seed's backing file, if
    /// present.
    async fn lookup(&self, id: ChunkId) -> Option<SeedLocation>;

    /// The path of the seed's backing file, used for reflink/copy and for
    /// `same_filesystem` checks.
    fn path(&self) -> &Path;

    /// Verifies that this seed's index still matches the current bytes of
    /// its backing file. Index-seeds check this once before assembly
    /// begins; the self-seed is trivially always valid (it IS the bytes
    /// being written).
    async fn validate(&self) -> Result<(), CasyncError>;

    /// Whether this seed's backing file lives on the same filesystem/device
    /// as `target_path`, making filesystem-level clone applicable.
    fn same_filesystem(&self, target_path: &Path) -> bool;
}

/// Governs what happens when an index-seed fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSeedAction {
    /// Abort assembly entirely.
    BailOut,
    /// Demote the seed to empty and continue without it.
    Skip,
    /// Re-index the seed file in place and retry.
    Regenerate,
}
