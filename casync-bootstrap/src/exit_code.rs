// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Exit Codes
//!
//! Maps application results to Unix-style exit codes so scripts invoking
//! `casync` can branch on failure class without parsing stderr.

use casync_domain::CasyncError;
use std::fmt;

/// Exit codes returned by the `casync` binary.
///
/// Numeric values follow the BSD `sysexits.h` convention where a plausible
/// analogue exists, falling back to a small private range above it
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// EX_USAGE: bad CLI arguments.
    Usage = 64,
    /// EX_DATAERR: the index or a chunk failed validation.
    DataError = 65,
    /// EX_NOINPUT: an input file or seed could not be opened.
    NoInput = 66,
    /// EX_IOERR: an I/O error occurred against a store or the target file.
    IoError = 74,
    /// EX_TEMPFAIL: a retryable condition (rate limit, transient I/O).
    TempFail = 75,
    /// Operation was cancelled via the shutdown coordinator.
    Interrupted = 130,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// Maps a [`CasyncError`] to the exit code a shell script should see.
pub fn map_error_to_exit_code(error: &CasyncError) -> ExitCode {
    match error {
        CasyncError::ChunkMissing { .. } | CasyncError::ChunkInvalid { .. } => ExitCode::DataError,
        CasyncError::InvalidIndex(_) | CasyncError::InvalidSeed(_) => ExitCode::DataError,
        CasyncError::Interrupted => ExitCode::Interrupted,
        CasyncError::RateLimitExceeded => ExitCode::TempFail,
        CasyncError::ProtocolError(_) => ExitCode::IoError,
        CasyncError::Io(_) => ExitCode::IoError,
        CasyncError::InvalidConfiguration(_) => ExitCode::Usage,
        CasyncError::Internal(_) => ExitCode::GeneralError,
    }
}

/// Converts an application result into a process exit code, logging the
/// error (if any) at `error` level first.
pub fn result_to_exit_code(result: Result<(), CasyncError>) -> std::process::ExitCode {
    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            tracing::error!(error = %e, category = e.category(), "casync exiting with failure");
            map_error_to_exit_code(&e).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert_eq!(ExitCode::Success as u8, 0);
    }

    #[test]
    fn chunk_missing_maps_to_data_error() {
        let err = CasyncError::chunk_missing(casync_domain::ChunkId::from_bytes([0u8; 32]));
        assert_eq!(map_error_to_exit_code(&err), ExitCode::DataError);
    }

    #[test]
    fn interrupted_maps_to_130() {
        assert_eq!(map_error_to_exit_code(&CasyncError::Interrupted) as u8, 130);
    }

    #[test]
    fn rate_limit_is_retryable_tempfail() {
        assert_eq!(map_error_to_exit_code(&CasyncError::RateLimitExceeded), ExitCode::TempFail);
    }
}
