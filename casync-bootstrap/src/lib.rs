// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides:
//!
//! - **Entry point** - CLI parsing and validation for the `chunk`/`assemble`
//!   subcommands
//! - **Signal handling** - Graceful shutdown (SIGTERM, SIGINT on Unix; Ctrl-C
//!   on Windows)
//! - **Error handling** - process exit code mapping
//! - **Async coordination** - shutdown coordination and cancellation
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          BOOTSTRAP (This Module)            │
//! │  - Entry Point                              │
//! │  - Secure Arg Parsing                       │
//! │  - Signal Handling                          │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │         APPLICATION LAYER (casync)          │
//! │  - Chunk storage pipeline                   │
//! │  - Assembly engine                          │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │           DOMAIN LAYER (casync-domain)      │
//! │  - Store / Converter / Seed traits          │
//! │  - Value objects                            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Bootstrap can depend on every other layer; no other layer depends on
//! bootstrap. This keeps the worker-pool and pipeline code testable without
//! a CLI and signal handlers in the loop.
//!
//! ## Module Structure
//!
//! - `cli` - argument parsing and validation
//! - `exit_code` - process exit code mapping
//! - `logger` - bootstrap-phase logging abstraction
//! - `shutdown` - cancellation token and shutdown coordination
//! - `signals` - OS signal handling

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, ParseError, ValidatedCli, ValidatedCommand};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};

/// Parses and validates CLI arguments.
///
/// Handles clap parsing plus the security checks in [`cli::SecureArgParser`]
/// (path traversal, null bytes, shell metacharacters). The caller runs the
/// application logic and maps the result to an exit code with
/// [`result_to_exit_code`].
///
/// # Errors
///
/// Returns [`cli::ParseError`] if CLI parsing or validation fails. Clap
/// handles `--help`/`--version` itself and exits the process before this
/// function returns.
pub fn bootstrap_cli() -> Result<ValidatedCli, cli::ParseError> {
    cli::parse_and_validate()
}
