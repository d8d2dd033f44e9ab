// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Authenticated Encryption Converters
//!
//! Two [`Converter`] implementations over a passphrase-derived key: XChaCha20-
//! Poly1305 (24-byte nonce, the default) and AES-256-GCM (12-byte nonce, for
//! interop with stores that expect it). Both prepend their nonce to the
//! ciphertext and derive their key from a passphrase with Argon2 so two
//! independent nodes sharing only a passphrase agree on the same key
//! without exchanging key material.
//!
//! The extension fragment each contributes ends in a short hex handle
//! derived from the key (not the passphrase) so that two chunk files
//! encrypted under the same key agree on the same suffix, while the
//! passphrase itself never appears in a filename.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce as AesNonce};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use casync_domain::{CasyncError, Converter};
use chacha20poly1305::{Key as ChaChaKey, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const XCHACHA_NONCE_LEN: usize = 24;
const AES_GCM_NONCE_LEN: usize = 12;

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CasyncError> {
    let argon2 = Argon2::default();
    let salt_string =
        SaltString::encode_b64(salt).map_err(|e| CasyncError::InvalidConfiguration(format!("invalid salt: {e}")))?;

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt_string)
        .map_err(|e| CasyncError::InvalidConfiguration(format!("argon2 key derivation failed: {e}")))?;

    let hash_bytes = hash
        .hash
        .ok_or_else(|| CasyncError::internal("argon2 produced no hash output"))?;
    let raw = hash_bytes.as_bytes();
    if raw.len() < KEY_LEN {
        return Err(CasyncError::internal("derived key material too short"));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&raw[..KEY_LEN]);
    Ok(Zeroizing::new(key))
}

fn key_handle(key: &[u8]) -> String {
    hex::encode(&casync_domain::ChunkId::compute(key).as_bytes()[..4])
}

/// XChaCha20-Poly1305, keyed by Argon2(passphrase, salt). The default AEAD
/// converter: a 24-byte nonce is large enough to generate at random per
/// chunk with negligible collision risk, unlike the 12-byte nonces used by
/// AES-GCM/ChaCha20-Poly1305.
pub struct XChaChaConverter {
    key: Zeroizing<[u8; KEY_LEN]>,
    extension: String,
}

impl XChaChaConverter {
    pub fn new(passphrase: &str, salt: &[u8]) -> Result<Self, CasyncError> {
        let key = derive_key(passphrase, salt)?;
        let extension = format!(".xchacha20poly1305-{}", key_handle(key.as_slice()));
        Ok(Self { key, extension })
    }
}

impl Converter for XChaChaConverter {
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let cipher_key = ChaChaKey::from_slice(self.key.as_slice());
        let cipher = XChaCha20Poly1305::new(cipher_key);

        let mut nonce_bytes = [0u8; XCHACHA_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| CasyncError::internal(format!("xchacha20-poly1305 encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(XCHACHA_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        if data.len() < XCHACHA_NONCE_LEN {
            return Err(CasyncError::chunk_invalid(casync_domain::ChunkId::compute(data)));
        }
        let (nonce_bytes, ciphertext) = data.split_at(XCHACHA_NONCE_LEN);
        let cipher_key = ChaChaKey::from_slice(self.key.as_slice());
        let cipher = XChaCha20Poly1305::new(cipher_key);
        let nonce = XNonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CasyncError::chunk_invalid(casync_domain::ChunkId::compute(data)))
    }

    fn equal(&self, other: &dyn Converter) -> bool {
        other.extension() == self.extension
    }

    fn extension(&self) -> String {
        self.extension.clone()
    }
}

/// AES-256-GCM, keyed by Argon2(passphrase, salt). Offered alongside
/// XChaCha20-Poly1305 for interop with stores that require AES-GCM.
pub struct Aes256GcmConverter {
    key: Zeroizing<[u8; KEY_LEN]>,
    extension: String,
}

impl Aes256GcmConverter {
    pub fn new(passphrase: &str, salt: &[u8]) -> Result<Self, CasyncError> {
        let key = derive_key(passphrase, salt)?;
        let extension = format!(".aes-256-gcm-{}", key_handle(key.as_slice()));
        Ok(Self { key, extension })
    }
}

impl Converter for Aes256GcmConverter {
    fn to_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        let cipher_key = AesKey::<Aes256Gcm>::from_slice(self.key.as_slice());
        let cipher = Aes256Gcm::new(cipher_key);

        let mut nonce_bytes = [0u8; AES_GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = AesNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| CasyncError::internal(format!("aes-256-gcm encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(AES_GCM_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn from_storage(&self, data: &[u8]) -> Result<Vec<u8>, CasyncError> {
        if data.len() < AES_GCM_NONCE_LEN {
            return Err(CasyncError::chunk_invalid(casync_domain::ChunkId::compute(data)));
        }
        let (nonce_bytes, ciphertext) = data.split_at(AES_GCM_NONCE_LEN);
        let cipher_key = AesKey::<Aes256Gcm>::from_slice(self.key.as_slice());
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = AesNonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CasyncError::chunk_invalid(casync_domain::ChunkId::compute(data)))
    }

    fn equal(&self, other: &dyn Converter) -> bool {
        other.extension() == self.extension
    }

    fn extension(&self) -> String {
        self.extension.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xchacha_round_trips() {
        let converter = XChaChaConverter::new("correct horse battery staple", b"fixed-test-salt-").unwrap();
        let data = b"top secret chunk bytes".to_vec();
        let stored = converter.to_storage(&data).unwrap();
        assert_ne!(stored, data);
        let restored = converter.from_storage(&stored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn xchacha_rejects_tampered_ciphertext() {
        let converter = XChaChaConverter::new("passphrase", b"fixed-test-salt-").unwrap();
        let mut stored = converter.to_storage(b"data").unwrap();
        let last = stored.len() - 1;
        stored[last] ^= 0xFF;
        assert!(converter.from_storage(&stored).is_err());
    }

    #[test]
    fn xchacha_wrong_key_yields_chunk_invalid() {
        let encrypter = XChaChaConverter::new("key-one", b"fixed-test-salt-").unwrap();
        let decrypter = XChaChaConverter::new("key-two", b"fixed-test-salt-").unwrap();
        let stored = encrypter.to_storage(b"data").unwrap();
        assert!(matches!(decrypter.from_storage(&stored), Err(CasyncError::ChunkInvalid { .. })));
    }

    #[test]
    fn aes_gcm_round_trips() {
        let converter = Aes256GcmConverter::new("correct horse battery staple", b"fixed-test-salt-").unwrap();
        let data = b"top secret chunk bytes".to_vec();
        let stored = converter.to_storage(&data).unwrap();
        let restored = converter.from_storage(&stored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn aes_gcm_wrong_key_yields_chunk_invalid() {
        let encrypter = Aes256GcmConverter::new("key-one", b"fixed-test-salt-").unwrap();
        let decrypter = Aes256GcmConverter::new("key-two", b"fixed-test-salt-").unwrap();
        let stored = encrypter.to_storage(b"data").unwrap();
        assert!(matches!(decrypter.from_storage(&stored), Err(CasyncError::ChunkInvalid { .. })));
    }

    #[test]
    fn same_passphrase_and_salt_yield_same_handle() {
        let a = XChaChaConverter::new("shared secret", b"fixed-salt").unwrap();
        let b = XChaChaConverter::new("shared secret", b"fixed-salt").unwrap();
        assert_eq!(a.extension(), b.extension());
        assert!(a.equal(&b));
    }

    #[test]
    fn different_passphrases_yield_different_handles() {
        let a = XChaChaConverter::new("secret-a", b"fixed-salt").unwrap();
        let b = XChaChaConverter::new("secret-b", b"fixed-salt").unwrap();
        assert_ne!(a.extension(), b.extension());
    }
}
