//! # secretkit
//!
//! Secret values for declarative state files.
//!
//! Secrets are wrapped in [`Secret`], which serializes to a one-field
//! `{"@secret": ...}` object. Before state is written, [`seal`] replaces
//! each plaintext with an AES-256-GCM-SIV blob under a key derived from the
//! deployment password and salt; [`unseal`] reverses it on read and
//! [`reseal`] moves ciphertext from one password to another.
//!
//! ## Example
//!
//! ```
//! use secretkit::{Cipher, Salt, Secret};
//! use serde_json::json;
//!
//! let salt = Salt::generate()?;
//! let cipher = Cipher::derive("correct horse battery staple", &salt)?;
//!
//! let props = json!({ "user": "admin", "password": Secret::new("hunter2") });
//! let on_disk = secretkit::seal(&props, Some(&cipher))?;
//! assert!(!on_disk.to_string().contains("hunter2"));
//!
//! assert_eq!(secretkit::unseal(&on_disk, Some(&cipher))?, props);
//! # Ok::<(), secretkit::Error>(())
//! ```

mod cipher;
mod error;
mod seal;
mod secret;

pub use cipher::{Cipher, SALT_LEN, Salt};
pub use error::{Error, Result};
pub use seal::{contains_secret, deserialize, reseal, seal, secret_leaf, serialize, unseal};
pub use secret::{SECRET_KEY, Secret, SecretRegistry};
