// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunker Parameters Value Object
//!
//! `ChunkerParams` carries the three sizes that parameterise the rolling-hash
//! chunker (`min`, `avg`, `max`) plus the feature-flag bits carried alongside
//! them in the index header. The type validates `min ≤ avg ≤ max` and
//! `min > 0` at construction so that downstream code (chunker, index codec)
//! never has to re-check the ordering.

use crate::error::CasyncError;

/// `min=16KiB, avg=64KiB, max=256KiB` — the default chunker sizing.
pub const DEFAULT_MIN_SIZE: u64 = 16 * 1024;
pub const DEFAULT_AVG_SIZE: u64 = 64 * 1024;
pub const DEFAULT_MAX_SIZE: u64 = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerParams {
    pub feature_flags: u64,
    pub min_size: u64,
    pub avg_size: u64,
    pub max_size: u64,
}

impl ChunkerParams {
    pub fn new(feature_flags: u64, min_size: u64, avg_size: u64, max_size: u64) -> Result<Self, CasyncError> {
        if min_size == 0 {
            return Err(CasyncError::InvalidConfiguration("chunk_size_min must be > 0".into()));
        }
        if min_size > avg_size {
            return Err(CasyncError::InvalidConfiguration(format!(
                "chunk_size_min ({min_size}) must be <= chunk_size_avg ({avg_size})"
            )));
        }
        if avg_size > max_size {
            return Err(CasyncError::InvalidConfiguration(format!(
                "chunk_size_avg ({avg_size}) must be <= chunk_size_max ({max_size})"
            )));
        }
        Ok(Self {
            feature_flags,
            min_size,
            avg_size,
            max_size,
        })
    }
}

impl Default for ChunkerParams {
    fn default() -> Self {
        Self {
            feature_flags: 0,
            min_size: DEFAULT_MIN_SIZE,
            avg_size: DEFAULT_AVG_SIZE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_mandated_values() {
        let p = ChunkerParams::default();
        assert_eq!(p.min_size, 16 * 1024);
        assert_eq!(p.avg_size, 64 * 1024);
        assert_eq!(p.max_size, 256 * 1024);
    }

    #[test]
    fn rejects_min_greater_than_avg() {
        assert!(ChunkerParams::new(0, 100, 50, 200).is_err());
    }

    #[test]
    fn rejects_avg_greater_than_max() {
        assert!(ChunkerParams::new(0, 10, 200, 100).is_err());
    }

    #[test]
    fn rejects_zero_min() {
        assert!(ChunkerParams::new(0, 0, 50, 100).is_err());
    }

    #[test]
    fn accepts_equal_bounds() {
        assert!(ChunkerParams::new(0, 50, 50, 50).is_ok());
    }
}
