// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unauthenticated AES-256-CTR Converter
//!
//! A stream-cipher [`Converter`] for callers who have already verified
//! chunk integrity via content id (every chunk is looked up by its
//! SHA-512/256 hash, so a corrupted chunk is detected regardless) and want
//! confidentiality without the per-chunk overhead of an authentication
//! tag. Unlike the AEAD converters, a failed decrypt here is silent — there
//! is nothing in the ciphertext that can tell the caller it was wrong.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use casync_domain::{CasyncError, Converter};
use ctr::Ctr64BE;
use rand::RngCore;
use zeroize::Zeroizing;

type Aes256Ctr = Ctr64BE<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

pub struct Aes256CtrConverter {
    key: Zeroizing<[u8; KEY_LEN]>,
    extension: String,
}

impl Aes256CtrConverter {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let handle = hex::encode(&casync_domain::ChunkId::compute(&key).as_bytes()[..4]);
        Self {
            key: Zeroizing::new(key),
            extension: format!(".aes-256-ctr-{handle}"),
        }
    }
}

impl Converter for Aes256CtrConverter {
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = data.to_vec();
        let mut cipher = Aes256Ctr::new(
            GenericArray::from_slice(self.key.as_slice()),
            GenericArray::from_slice(&iv),
        );
        cipher.apply_keystream(&mut buffer);

        let mut out = Vec::with_capacity(IV_LEN + buffer.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        if data.len() < IV_LEN {
            return Err(CasyncError::chunk_invalid(casync_domain::ChunkId::compute(data)));
        }
        let (iv, ciphertext) = data.split_at(IV_LEN);
        let mut buffer = ciphertext.to_vec();
        let mut cipher = Aes256Ctr::new(GenericArray::from_slice(self.key.as_slice()), GenericArray::from_slice(iv));
        cipher.apply_keystream(&mut buffer);
        Ok(buffer)
    }

    fn equal(&self, other: &dyn Converter) -> bool {
        other.extension() == self.extension
    }

    fn extension(&self) -> String {
        self.extension.clone()
    }
}
