//! Secret handles and the registry that tracks them

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Key of the one-field wrapper object that marks a secret leaf
pub const SECRET_KEY: &str = "@secret";

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A sensitive string
///
/// The plaintext never shows up in `Debug` or `Display` output. Inside a
/// serialized value tree a secret appears as `{"@secret": "<plaintext>"}`;
/// the persistence layer swaps the plaintext for ciphertext with
/// [`seal`](crate::seal) before anything reaches disk.
#[derive(Clone)]
pub struct Secret {
    name: Option<String>,
    plaintext: Arc<str>,
}

impl Secret {
    /// Wrap a plaintext value without registering it
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self {
            name: None,
            plaintext: Arc::from(plaintext.into()),
        }
    }

    /// Wrap a plaintext value under a name
    pub fn named(name: impl Into<String>, plaintext: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            plaintext: Arc::from(plaintext.into()),
        }
    }

    /// Generate a random alphanumeric secret of `length` characters
    pub fn generate(length: usize) -> Result<Self> {
        let mut out = String::with_capacity(length);
        let mut buf = [0u8; 64];

        while out.len() < length {
            getrandom::getrandom(&mut buf).map_err(|e| Error::Random(e.to_string()))?;
            for byte in buf {
                // Reject the tail of the byte range so every symbol is equally likely
                if usize::from(byte) >= 248 {
                    continue;
                }
                out.push(char::from(ALPHANUMERIC[usize::from(byte) % ALPHANUMERIC.len()]));
                if out.len() == length {
                    break;
                }
            }
        }

        Ok(Self::new(out))
    }

    /// The plaintext
    pub fn expose(&self) -> &str {
        &self.plaintext
    }

    /// Optional name given when the secret was wrapped
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.plaintext == other.plaintext
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("plaintext", &"[redacted]")
            .finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[secret {}]", name),
            None => f.write_str("[secret]"),
        }
    }
}

#[derive(Serialize)]
struct WireRef<'a> {
    #[serde(rename = "@secret")]
    secret: &'a str,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Wire {
    #[serde(rename = "@secret")]
    secret: String,
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireRef {
            secret: &self.plaintext,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Wire::deserialize(deserializer).map(|wire| Secret::new(wire.secret))
    }
}

/// Every secret wrapped during a deployment run
///
/// Insert-only; bulk operations enumerate it to find live secrets.
#[derive(Debug, Default)]
pub struct SecretRegistry {
    secrets: Mutex<Vec<Secret>>,
}

impl SecretRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `plaintext` and register the resulting secret
    pub fn wrap(&self, plaintext: impl Into<String>, name: Option<&str>) -> Secret {
        let secret = match name {
            Some(name) => Secret::named(name, plaintext),
            None => Secret::new(plaintext),
        };
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(secret.clone());
        secret
    }

    /// Number of registered secrets
    pub fn len(&self) -> usize {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of registered secrets, unnamed ones skipped
    pub fn names(&self) -> Vec<String> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|s| s.name().map(str::to_string))
            .collect()
    }
}
