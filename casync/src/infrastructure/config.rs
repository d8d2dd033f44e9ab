// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Configuration
//!
//! `CasyncConfig` is loaded, not constructed by the domain: chunker defaults,
//! store concurrency, rate-limit parameters, and converter passphrase/key
//! settings all live here, layered from a TOML file overridden by `CASYNC_*`
//! environment variables. The domain types themselves (`ChunkerParams`,
//! `StoreOptions`, ...) stay free of any notion of where their values came
//! from — this module's job ends the moment it hands over validated values.

use casync_domain::{CasyncError, ChunkerParams, DEFAULT_AVG_SIZE, DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE};
use serde::Deserialize;
use std::path::Path;

/// Chunker sizing, mirrors [`ChunkerParams`] but as a deserialization target
/// (plain `u64`s, no invariant checking — that happens in [`CasyncConfig::build_chunker_params`]).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ChunkerSection {
    pub feature_flags: u64,
    pub min_size: u64,
    pub avg_size: u64,
    pub max_size: u64,
}

impl Default for ChunkerSection {
    fn default() -> Self {
        Self {
            feature_flags: 0,
            min_size: DEFAULT_MIN_SIZE,
            avg_size: DEFAULT_AVG_SIZE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Default concurrency and retry posture for store adapters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub worker_count: usize,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            worker_count: 4,
            rate_limit_per_sec: 0.0,
            rate_limit_burst: 0.0,
        }
    }
}

/// Passphrase and key-handle naming for the encryption converters.
/// The passphrase itself is never read from a config *file* — only from the
/// `CASYNC_CRYPTO_PASSPHRASE` environment override — so it never ends up
/// committed alongside a TOML file on disk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CryptoSection {
    pub key_handle: Option<String>,
    pub passphrase: Option<String>,
}

/// Top-level configuration, deserialized from the layered `config::Config`
/// built by [`CasyncConfig::load`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CasyncConfig {
    pub chunker: ChunkerSection,
    pub store: StoreSection,
    pub crypto: CryptoSection,
}

impl CasyncConfig {
    /// Loads configuration from `path` (if it exists; a missing path is not
    /// an error, the built-in defaults apply) layered under `CASYNC__`-prefixed
    /// environment variables, double-underscore-separated to address nested
    /// fields (e.g. `CASYNC__CHUNKER__AVG_SIZE=131072`).
    pub fn load(path: Option<&Path>) -> Result<Self, CasyncError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("CASYNC").separator("__"));

        let raw = builder
            .build()
            .map_err(|e| CasyncError::InvalidConfiguration(format!("loading configuration: {e}")))?;

        raw.try_deserialize()
            .map_err(|e| CasyncError::InvalidConfiguration(format!("parsing configuration: {e}")))
    }

    /// Builds validated [`ChunkerParams`] from the loaded chunker section.
    pub fn build_chunker_params(&self) -> Result<ChunkerParams, CasyncError> {
        ChunkerParams::new(
            self.chunker.feature_flags,
            self.chunker.min_size,
            self.chunker.avg_size,
            self.chunker.max_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_chunker_sizes() {
        let config = CasyncConfig::default();
        let params = config.build_chunker_params().unwrap();
        assert_eq!(params.min_size, DEFAULT_MIN_SIZE);
        assert_eq!(params.avg_size, DEFAULT_AVG_SIZE);
        assert_eq!(params.max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CasyncConfig::load(Some(Path::new("/nonexistent/casync.toml"))).unwrap();
        assert_eq!(config.store.worker_count, 4);
    }

    #[test]
    fn env_override_is_applied() {
        // SAFETY: test-only, no other test in this process reads this var concurrently.
        unsafe {
            std::env::set_var("CASYNC__STORE__WORKER_COUNT", "16");
        }
        let config = CasyncConfig::load(None).unwrap();
        unsafe {
            std::env::remove_var("CASYNC__STORE__WORKER_COUNT");
        }
        assert_eq!(config.store.worker_count, 16);
    }
}
