//! Error types for secret handling

use thiserror::Error;

/// Errors that can occur while encrypting or decrypting secrets
#[derive(Debug, Error)]
pub enum Error {
    /// A secret was encountered but no password is configured
    #[error("cannot {action} secret without a password")]
    MissingPassword {
        /// What was being attempted ("encrypt" or "decrypt")
        action: &'static str,
    },

    /// Key derivation rejected its inputs
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Encryption failed
    #[error("failed to encrypt secret")]
    Encrypt,

    /// Decryption failed (wrong password, wrong salt or tampered data)
    #[error("failed to decrypt secret: wrong password or corrupted data")]
    Decrypt,

    /// Ciphertext or salt is not valid base64
    #[error("invalid encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Ciphertext is too short to contain a nonce
    #[error("ciphertext is truncated ({0} bytes)")]
    Truncated(usize),

    /// Salt has the wrong length
    #[error("invalid salt: expected {expected} bytes, got {actual}")]
    InvalidSalt { expected: usize, actual: usize },

    /// Decrypted bytes are not UTF-8
    #[error("decrypted secret is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The OS random source failed
    #[error("random source unavailable: {0}")]
    Random(String),

    /// A value was expected to be a secret wrapper but is not
    #[error("value is not a secret: {0}")]
    NotASecret(String),
}

/// Result type for secret operations
pub type Result<T> = std::result::Result<T, Error>;
