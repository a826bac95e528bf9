//! Key derivation and authenticated encryption
//!
//! A 32-byte key is derived from the deployment password and salt with
//! Argon2id. Secrets are sealed with AES-256-GCM-SIV under a fresh 12-byte
//! nonce; the stored blob is `base64(nonce || ciphertext)`.

use crate::error::{Error, Result};
use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use argon2::Argon2;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Per-deployment salt mixed into key derivation
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Generate a random salt
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SALT_LEN];
        getrandom::getrandom(&mut bytes).map_err(|e| Error::Random(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Decode a salt previously produced by [`Salt::encode`]
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let array: [u8; SALT_LEN] = bytes.as_slice().try_into().map_err(|_| Error::InvalidSalt {
            expected: SALT_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Base64 form for persistence
    pub fn encode(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Salt").field(&self.encode()).finish()
    }
}

/// A derived key ready to encrypt and decrypt secrets
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256GcmSiv,
}

impl Cipher {
    /// Derive a cipher from a password and salt
    ///
    /// Derivation is expensive; derive once per run and reuse.
    pub fn derive(password: &str, salt: &Salt) -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| Error::Kdf(e.to_string()))?;

        let aead = Aes256GcmSiv::new_from_slice(&key).map_err(|e| Error::Kdf(e.to_string()))?;
        log::debug!("Derived secret encryption key");
        Ok(Self { aead })
    }

    /// Encrypt a plaintext into a base64 blob
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce).map_err(|e| Error::Random(e.to_string()))?;

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`]
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let bytes = STANDARD.decode(blob)?;
        if bytes.len() < NONCE_LEN {
            return Err(Error::Truncated(bytes.len()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher { .. }")
    }
}
