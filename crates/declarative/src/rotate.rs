//! Re-encrypting stored secrets under a new password

use crate::error::{Error, Result};
use crate::scope::SALT_KEY;
use crate::store::{ScopePath, StateStore};
use crate::types::{RotationSummary, State};
use secretkit::{Cipher, SALT_LEN, Salt};

/// Re-encrypt every secret stored under `root` from `old` to `new`
///
/// The deployment salt is kept. Every record is resealed in memory before
/// anything is written, so a wrong `old` password changes nothing; each
/// record is then replaced with a single atomic write.
pub fn rotate_password(
    store: &dyn StateStore,
    root: &ScopePath,
    old: &str,
    new: &str,
) -> Result<RotationSummary> {
    if old == new {
        return Err(Error::SamePassword);
    }

    let salt = store
        .get_meta(root, SALT_KEY)?
        .map(|encoded| Salt::decode(&encoded))
        .transpose()
        .map_err(|source| Error::Secret {
            fqn: root.to_string(),
            phase: None,
            source,
        })?;

    let mut rotation = Rotation {
        store,
        salt,
        old,
        new,
        ciphers: None,
        summary: RotationSummary::default(),
        rewrites: Vec::new(),
    };
    rotation.visit(root)?;

    let Rotation {
        mut summary,
        rewrites,
        ..
    } = rotation;
    for (scope, state) in rewrites {
        store.set(&scope, &state.id, &state)?;
        summary.records_rewritten += 1;
    }

    log::info!(
        "Rotated {} secrets in {} of {} records under {}",
        summary.secrets_rotated,
        summary.records_rewritten,
        summary.records_scanned,
        root
    );
    Ok(summary)
}

struct Rotation<'a> {
    store: &'a dyn StateStore,
    salt: Option<Salt>,
    old: &'a str,
    new: &'a str,
    ciphers: Option<(Cipher, Cipher)>,
    summary: RotationSummary,
    rewrites: Vec<(ScopePath, State)>,
}

impl Rotation<'_> {
    fn visit(&mut self, scope: &ScopePath) -> Result<()> {
        for state in self.store.all(scope)?.into_values() {
            self.summary.records_scanned += 1;
            if !state.contains_secret() {
                continue;
            }

            let (old, new) = self.ciphers(&state.fqn)?;
            let mut count = 0;
            let rotated = state
                .try_map_values(|value| {
                    let (value, n) = secretkit::reseal(value, &old, &new)?;
                    count += n;
                    Ok::<_, secretkit::Error>(value)
                })
                .map_err(|source| Error::Secret {
                    fqn: state.fqn.clone(),
                    phase: None,
                    source,
                })?;

            log::debug!("{}: resealed {} secrets", state.fqn, count);
            self.summary.secrets_rotated += count;
            self.rewrites.push((scope.clone(), rotated));
        }

        for child in self.store.children(scope)? {
            self.visit(&scope.child(&child))?;
        }
        Ok(())
    }

    /// Ciphers for both passwords, derived on the first record that needs them
    fn ciphers(&mut self, fqn: &str) -> Result<(Cipher, Cipher)> {
        if let Some(pair) = &self.ciphers {
            return Ok(pair.clone());
        }

        let secret_error = |source: secretkit::Error| Error::Secret {
            fqn: fqn.to_string(),
            phase: None,
            source,
        };
        let salt = self.salt.as_ref().ok_or_else(|| {
            secret_error(secretkit::Error::InvalidSalt {
                expected: SALT_LEN,
                actual: 0,
            })
        })?;
        let old = Cipher::derive(self.old, salt).map_err(secret_error)?;
        let new = Cipher::derive(self.new, salt).map_err(secret_error)?;

        self.ciphers = Some((old.clone(), new.clone()));
        Ok((old, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use crate::types::Status;
    use secretkit::Secret;
    use serde_json::json;

    fn sealed_record(id: &str, cipher: &Cipher) -> State {
        let mut state = State::new("k", id, id.to_string(), 0, json!({ "name": id }));
        state.status = Status::Created;
        state.output = Some(
            secretkit::seal(&json!({ "password": Secret::new("pw-value") }), Some(cipher))
                .unwrap(),
        );
        state
    }

    #[test]
    fn test_same_password_rejected_first() {
        let store = MemoryStateStore::new();
        let root = ScopePath::root(None, "dev");
        assert!(matches!(
            rotate_password(&store, &root, "same", "same"),
            Err(Error::SamePassword)
        ));
    }

    #[test]
    fn test_no_secrets_is_a_no_op() {
        let store = MemoryStateStore::new();
        let root = ScopePath::root(None, "dev");
        store
            .set(&root, "plain", &State::new("k", "plain", "plain".into(), 0, json!({})))
            .unwrap();

        let summary = rotate_password(&store, &root, "a", "b").unwrap();
        assert_eq!(summary.records_scanned, 1);
        assert_eq!(summary.records_rewritten, 0);
        assert_eq!(summary.secrets_rotated, 0);
    }

    #[test]
    fn test_rotation_walks_nested_scopes() {
        let store = MemoryStateStore::new();
        let root = ScopePath::root(Some("app"), "dev");
        let salt = Salt::generate().unwrap();
        store.set_meta(&root, SALT_KEY, &salt.encode()).unwrap();
        let old = Cipher::derive("old", &salt).unwrap();
        let new = Cipher::derive("new", &salt).unwrap();

        store.set(&root, "db", &sealed_record("db", &old)).unwrap();
        store.set(&root.child("api"), "key", &sealed_record("key", &old)).unwrap();

        let summary = rotate_password(&store, &root, "old", "new").unwrap();
        assert_eq!(summary.records_scanned, 2);
        assert_eq!(summary.records_rewritten, 2);
        assert_eq!(summary.secrets_rotated, 2);

        let rotated = store.get(&root.child("api"), "key").unwrap().unwrap();
        let output = rotated.output.unwrap();
        assert!(secretkit::unseal(&output, Some(&old)).is_err());
        assert_eq!(
            secretkit::unseal(&output, Some(&new)).unwrap()["password"],
            json!({ "@secret": "pw-value" })
        );
        // Salt is reused
        assert_eq!(store.get_meta(&root, SALT_KEY).unwrap(), Some(salt.encode()));
    }

    #[test]
    fn test_wrong_old_password_changes_nothing() {
        let store = MemoryStateStore::new();
        let root = ScopePath::root(None, "dev");
        let salt = Salt::generate().unwrap();
        store.set_meta(&root, SALT_KEY, &salt.encode()).unwrap();
        let old = Cipher::derive("old", &salt).unwrap();

        let before = sealed_record("db", &old);
        store.set(&root, "db", &before).unwrap();

        let err = rotate_password(&store, &root, "wrong", "new").unwrap_err();
        assert!(matches!(err, Error::Secret { .. }));
        assert_eq!(store.get(&root, "db").unwrap(), Some(before));
    }
}
