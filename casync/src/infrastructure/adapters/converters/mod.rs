// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete [`Converter`](casync_domain::Converter) implementations:
//! compression and the encryption algorithms.

pub mod aead;
pub mod aes_ctr;
pub mod compressor;

pub use aead::{Aes256GcmConverter, XChaChaConverter};
pub use aes_ctr::Aes256CtrConverter;
pub use compressor::ZstdCompressor;
