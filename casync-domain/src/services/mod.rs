// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services: the trait contracts (`Store`, `Converter`, `Seed`) that
//! application and infrastructure code implements and composes. None of
//! these traits perform I/O themselves — they describe *what* operations
//! exist, leaving the concrete sync/async split to the infrastructure
//! layer that implements them.

pub mod converter;
pub mod seed;
pub mod store;

pub use converter::Converter;
pub use seed::{InvalidSeedAction, Seed, SeedLocation};
pub use store::{Store, WriteStore};
