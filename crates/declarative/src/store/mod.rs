//! State persistence
//!
//! A [`StateStore`] holds one [`State`] record per resource, grouped by the
//! [`ScopePath`] of the scope that owns it, plus a few string metadata
//! entries per scope (the encryption salt lives at the root). Records pass
//! through the store exactly as given; secrets are already sealed.

mod fs;
mod memory;

pub use fs::FileSystemStateStore;
pub use memory::MemoryStateStore;

use crate::error::Result;
use crate::types::State;
use std::collections::BTreeMap;
use std::fmt;

/// Chain of scope names from the root down
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopePath(Vec<String>);

impl ScopePath {
    /// Path of a root scope: the optional app name followed by the stage
    pub fn root(app: Option<&str>, stage: &str) -> Self {
        Self(app.into_iter().chain([stage]).map(str::to_string).collect())
    }

    /// Build a path from explicit segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path of a direct child
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &ScopePath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Fully qualified name of a resource in this scope
    pub fn fqn(&self, id: &str) -> String {
        if self.0.is_empty() {
            id.to_string()
        } else {
            format!("{}/{}", self, id)
        }
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Persistent key-value storage of resource records
///
/// Implementations must make each [`set`](StateStore::set) atomic: a reader
/// sees either the previous record or the new one, never a torn write.
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Fetch one record
    fn get(&self, scope: &ScopePath, id: &str) -> Result<Option<State>>;

    /// Insert or replace one record
    fn set(&self, scope: &ScopePath, id: &str, state: &State) -> Result<()>;

    /// Remove one record; removing a missing record is not an error
    fn delete(&self, scope: &ScopePath, id: &str) -> Result<()>;

    /// Every record directly in `scope`, keyed by resource id
    fn all(&self, scope: &ScopePath) -> Result<BTreeMap<String, State>>;

    /// Ids of every record directly in `scope`
    fn list(&self, scope: &ScopePath) -> Result<Vec<String>> {
        Ok(self.all(scope)?.into_keys().collect())
    }

    /// Count of records directly in `scope`
    fn count(&self, scope: &ScopePath) -> Result<usize> {
        Ok(self.list(scope)?.len())
    }

    /// Names of child scopes of `scope` that hold anything
    fn children(&self, scope: &ScopePath) -> Result<Vec<String>>;

    /// Drop `scope` along with its records, metadata and descendants
    fn remove_scope(&self, scope: &ScopePath) -> Result<()>;

    /// Read a metadata entry of `scope`
    fn get_meta(&self, scope: &ScopePath, key: &str) -> Result<Option<String>>;

    /// Write a metadata entry of `scope`
    fn set_meta(&self, scope: &ScopePath, key: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        assert_eq!(ScopePath::root(Some("shop"), "prod").to_string(), "shop/prod");
        assert_eq!(ScopePath::root(None, "prod").to_string(), "prod");
    }

    #[test]
    fn test_child_and_fqn() {
        let root = ScopePath::root(Some("shop"), "prod");
        let api = root.child("api");
        assert_eq!(api.fqn("bucket"), "shop/prod/api/bucket");
        assert!(root.is_ancestor_of(&api));
        assert!(!api.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert_eq!(ScopePath::default().fqn("x"), "x");
    }
}
