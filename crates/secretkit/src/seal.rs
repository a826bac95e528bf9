//! Converting secret leaves between plaintext and ciphertext
//!
//! A secret leaf is an object with exactly one key, `@secret`, holding a
//! string. In memory that string is plaintext; on disk it is a blob from
//! [`Cipher::encrypt`]. Everything else in the tree is copied unchanged.

use crate::cipher::Cipher;
use crate::error::{Error, Result};
use crate::secret::{SECRET_KEY, Secret};
use serde_json::{Map, Value};

/// The string inside a secret leaf, if `value` is one
pub fn secret_leaf(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(SECRET_KEY).and_then(Value::as_str),
        _ => None,
    }
}

/// Whether any secret leaf appears in `value`
pub fn contains_secret(value: &Value) -> bool {
    if secret_leaf(value).is_some() {
        return true;
    }
    match value {
        Value::Object(map) => map.values().any(contains_secret),
        Value::Array(items) => items.iter().any(contains_secret),
        _ => false,
    }
}

/// Encrypt every secret leaf for persistence
///
/// Fails with [`Error::MissingPassword`] if a secret is present and no
/// cipher is available; values without secrets pass through untouched.
pub fn seal(value: &Value, cipher: Option<&Cipher>) -> Result<Value> {
    map_secrets(value, &mut |plaintext| {
        cipher
            .ok_or(Error::MissingPassword { action: "encrypt" })?
            .encrypt(plaintext)
    })
}

/// Decrypt every secret leaf of a persisted value
pub fn unseal(value: &Value, cipher: Option<&Cipher>) -> Result<Value> {
    map_secrets(value, &mut |blob| {
        cipher
            .ok_or(Error::MissingPassword { action: "decrypt" })?
            .decrypt(blob)
    })
}

/// Re-encrypt every secret leaf from `old` to `new`
///
/// Returns the rewritten value and the number of secrets it holds. Nothing
/// is returned unless every secret decrypted under `old`.
pub fn reseal(value: &Value, old: &Cipher, new: &Cipher) -> Result<(Value, usize)> {
    let mut count = 0;
    let rewritten = map_secrets(value, &mut |blob| {
        count += 1;
        new.encrypt(&old.decrypt(blob)?)
    })?;
    Ok((rewritten, count))
}

/// Encrypt a single secret into its persisted wrapper
pub fn serialize(secret: &Secret, cipher: Option<&Cipher>) -> Result<Value> {
    let cipher = cipher.ok_or(Error::MissingPassword { action: "encrypt" })?;
    Ok(wrap(cipher.encrypt(secret.expose())?))
}

/// Decrypt a persisted wrapper back into a secret
pub fn deserialize(value: &Value, cipher: Option<&Cipher>) -> Result<Secret> {
    let blob = secret_leaf(value).ok_or_else(|| Error::NotASecret(value.to_string()))?;
    let cipher = cipher.ok_or(Error::MissingPassword { action: "decrypt" })?;
    Ok(Secret::new(cipher.decrypt(blob)?))
}

fn wrap(inner: String) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(SECRET_KEY.to_string(), Value::String(inner));
    Value::Object(map)
}

fn map_secrets<F>(value: &Value, f: &mut F) -> Result<Value>
where
    F: FnMut(&str) -> Result<String>,
{
    if let Some(inner) = secret_leaf(value) {
        return Ok(wrap(f(inner)?));
    }

    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), map_secrets(item, f)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| map_secrets(item, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
