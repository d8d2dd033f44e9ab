// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first argument validation.
//!
//! ## Pipeline
//!
//! ```text
//! 1. clap parses argv into `Cli`
//! 2. SecureArgParser validates every path/string argument
//! 3. validate_cli() range-checks numeric arguments
//! 4. ValidatedCli is handed to the application layer
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while parsing or validating CLI arguments.
#[derive(Debug, Error, Clone)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("unsafe argument rejected: {0}")]
    UnsafeArgument(String),
}

/// Validates CLI arguments against path traversal and injection patterns.
///
/// This is a defense-in-depth layer: clap already constrains the shape of
/// argv, but it does not stop a path argument from containing a null byte or
/// a `../../` traversal sequence that later file-opening code would follow
/// blindly.
pub struct SecureArgParser;

impl SecureArgParser {
    /// Validates a free-form string argument (chunk store IDs, etc.).
    ///
    /// Rejects null bytes and embedded shell metacharacters that have no
    /// legitimate use in a store identifier or index filename.
    pub fn validate_argument(value: &str) -> Result<(), ParseError> {
        if value.is_empty() {
            return Err(ParseError::UnsafeArgument("empty argument".to_string()));
        }
        if value.contains('\0') {
            return Err(ParseError::UnsafeArgument("argument contains a null byte".to_string()));
        }
        if value.chars().any(|c| matches!(c, ';' | '|' | '&' | '`' | '$')) {
            return Err(ParseError::UnsafeArgument(format!(
                "argument '{value}' contains a shell metacharacter"
            )));
        }
        Ok(())
    }

    /// Validates a path argument that is expected to already exist, and
    /// returns its canonicalized form.
    pub fn validate_path(value: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(value)?;
        let path = PathBuf::from(value);
        path.canonicalize().map_err(|_| ParseError::PathNotFound(path))
    }
}

/// Raw CLI surface parsed by clap.
#[derive(Debug, Parser)]
#[command(name = "casync", version, about = "casync-compatible chunk store and synchronizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a configuration file (overrides CASYNC_CONFIG and defaults).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of concurrent store/seed workers used by the chunk-storage
    /// pipeline, defaults to `StoreOptions::concurrency`.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Depth of the in-order bounded channel feeding the worker pool.
    #[arg(long, global = true, default_value_t = 16)]
    pub channel_depth: usize,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Chunk a file, storing chunks in `store` and writing an index to
    /// `index`.
    Chunk {
        input: PathBuf,
        store: String,
        index: PathBuf,

        #[arg(long)]
        min_size: Option<u64>,
        #[arg(long)]
        avg_size: Option<u64>,
        #[arg(long)]
        max_size: Option<u64>,

        /// Compression/encryption converters to apply, e.g. `zstd`,
        /// `zstd,xchacha20poly1305`.
        #[arg(long, value_delimiter = ',')]
        converters: Vec<String>,
    },

    /// Reassemble `target` from `index`, fetching missing chunks from
    /// `store` and reusing bytes already present in `target` or in any
    /// `--seed` file.
    Assemble {
        index: PathBuf,
        store: String,
        target: PathBuf,

        /// Additional seed files/indexes to consult before the store.
        #[arg(long = "seed")]
        seeds: Vec<PathBuf>,

        #[arg(long)]
        converters: Vec<String>,

        /// Skip verifying chunk hashes on read (trusts the store).
        #[arg(long)]
        skip_verify: bool,
    },
}

/// CLI configuration after security validation.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub channel_depth: usize,
}

/// Validated command variants, one per [`Commands`] arm.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Chunk {
        input: PathBuf,
        store: String,
        index: PathBuf,
        min_size: Option<u64>,
        avg_size: Option<u64>,
        max_size: Option<u64>,
        converters: Vec<String>,
    },
    Assemble {
        index: PathBuf,
        store: String,
        target: PathBuf,
        seeds: Vec<PathBuf>,
        converters: Vec<String>,
        skip_verify: bool,
    },
}

/// Parses argv with clap, then runs [`validate_cli`] over the result.
///
/// # Errors
///
/// Returns [`ParseError`] if any argument fails validation.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    validate_cli(Cli::parse())
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    if cli.channel_depth == 0 {
        return Err(ParseError::InvalidValue {
            arg: "channel-depth".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    if let Some(concurrency) = cli.concurrency {
        if concurrency == 0 || concurrency > 1024 {
            return Err(ParseError::InvalidValue {
                arg: "concurrency".to_string(),
                reason: "must be between 1 and 1024".to_string(),
            });
        }
    }

    if let Some(ref path) = cli.config {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
    }

    let command = match cli.command {
        Commands::Chunk {
            input,
            store,
            index,
            min_size,
            avg_size,
            max_size,
            converters,
        } => {
            let validated_input = SecureArgParser::validate_path(&input.to_string_lossy())?;
            SecureArgParser::validate_argument(&store)?;
            SecureArgParser::validate_argument(&index.to_string_lossy())?;
            for c in &converters {
                SecureArgParser::validate_argument(c)?;
            }
            ValidatedCommand::Chunk {
                input: validated_input,
                store,
                index,
                min_size,
                avg_size,
                max_size,
                converters,
            }
        }
        Commands::Assemble {
            index,
            store,
            target,
            seeds,
            converters,
            skip_verify,
        } => {
            let validated_index = SecureArgParser::validate_path(&index.to_string_lossy())?;
            SecureArgParser::validate_argument(&store)?;
            SecureArgParser::validate_argument(&target.to_string_lossy())?;
            let mut validated_seeds = Vec::with_capacity(seeds.len());
            for seed in &seeds {
                validated_seeds.push(SecureArgParser::validate_path(&seed.to_string_lossy())?);
            }
            for c in &converters {
                SecureArgParser::validate_argument(c)?;
            }
            ValidatedCommand::Assemble {
                index: validated_index,
                store,
                target,
                seeds: validated_seeds,
                converters,
                skip_verify,
            }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config: cli.config,
        concurrency: cli.concurrency,
        channel_depth: cli.channel_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_argument() {
        assert!(SecureArgParser::validate_argument("").is_err());
    }

    #[test]
    fn rejects_null_byte() {
        assert!(SecureArgParser::validate_argument("foo\0bar").is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(SecureArgParser::validate_argument("store; rm -rf /").is_err());
        assert!(SecureArgParser::validate_argument("store`whoami`").is_err());
    }

    #[test]
    fn accepts_plain_argument() {
        assert!(SecureArgParser::validate_argument("local-store").is_ok());
    }

    #[test]
    fn rejects_nonexistent_path() {
        assert!(SecureArgParser::validate_path("/no/such/path/casync-test").is_err());
    }

    #[test]
    fn validate_cli_rejects_zero_channel_depth() {
        let cli = Cli {
            command: Commands::Chunk {
                input: PathBuf::from("/tmp"),
                store: "store".to_string(),
                index: PathBuf::from("out.caibx"),
                min_size: None,
                avg_size: None,
                max_size: None,
                converters: vec![],
            },
            verbose: false,
            config: None,
            concurrency: None,
            channel_depth: 0,
        };
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { arg, .. }) if arg == "channel-depth"));
    }
}
