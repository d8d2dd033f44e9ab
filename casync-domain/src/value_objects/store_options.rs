// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Options Value Object
//!
//! `StoreOptions` is the superset of configuration knobs a concrete `Store`
//! implementation may consult. Each store interprets only the fields
//! relevant to it: a local store ignores TLS/auth fields, an HTTP
//! store ignores `concurrency`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub concurrency: usize,
    pub tls_client_cert: Option<String>,
    pub tls_client_key: Option<String>,
    pub tls_ca_cert: Option<String>,
    pub trust_insecure: bool,
    pub http_auth: Option<String>,
    pub timeout: Option<Duration>,
    pub error_retry: u32,
    pub skip_verify: bool,
    pub uncompressed: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            tls_client_cert: None,
            tls_client_key: None,
            tls_ca_cert: None,
            trust_insecure: false,
            http_auth: None,
            timeout: None,
            error_retry: 0,
            skip_verify: false,
            uncompressed: false,
        }
    }
}

impl StoreOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_skip_verify(mut self, skip_verify: bool) -> Self {
        self.skip_verify = skip_verify;
        self
    }

    pub fn with_error_retry(mut self, retries: u32) -> Self {
        self.error_retry = retries;
        self
    }

    pub fn with_uncompressed(mut self, uncompressed: bool) -> Self {
        self.uncompressed = uncompressed;
        self
    }
}
