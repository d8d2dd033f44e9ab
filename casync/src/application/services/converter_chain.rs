// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Converter Chain
//!
//! [`ConverterChain`] composes an ordered list of [`Converter`]s into a
//! single reversible transform: `to_storage` applies them left to right
//! (compress, then encrypt), `from_storage` applies them right to left
//! (decrypt, then decompress). The chain's `extension()` concatenates each
//! link's extension fragment in order, matching the `<id><ext1><ext2>`
//! chunk-file naming convention.

use casync_domain::{CasyncError, Converter};
use std::sync::Arc;

/// An ordered composition of converters, applied as a single unit.
#[derive(Clone)]
pub struct ConverterChain {
    links: Vec<Arc<dyn Converter>>,
}

impl ConverterChain {
    pub fn new(links: Vec<Arc<dyn Converter>>) -> Self {
        Self { links }
    }

    pub fn empty() -> Self {
        Self { links: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }
}

impl Converter for ConverterChain {
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let mut bytes = data.to_vec();
        for link in &self.links {
            bytes = link.to_storage(&bytes)?;
        }
        Ok(bytes)
    }

    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let mut bytes = data.to_vec();
        for link in self.links.iter().rev() {
            bytes = link.from_storage(&bytes)?;
        }
        Ok(bytes)
    }

    fn equal(&self, other: &dyn Converter) -> bool {
        // Chains are compared by their combined extension: two chains with
        // the same link extensions in the same order are configured
        // identically, since each link's own `equal` is what produced that
        // extension in the first place (key-handle suffixes included).
        self.extension() == other.extension()
    }

    fn extension(&self) -> String {
        self.links.iter().map(|l| l.extension()).collect()
    }
}
