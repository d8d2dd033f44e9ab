// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain error module.
//!
//! Exposes [`CasyncError`], the single error type returned by every domain
//! trait (`Store`, `Converter`, `Seed`) and propagated up through the
//! application and infrastructure layers.

mod casync_error;

pub use casync_error::CasyncError;
