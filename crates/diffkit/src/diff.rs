//! Structural diff between two JSON snapshots

use crate::error::Result;
use crate::path::Path;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key-paths that differ between an original and a changed snapshot
///
/// The three maps are disjoint. Arrays are compared element by element, the
/// same way objects are compared key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Paths present in the changed snapshot only, with their new value
    pub added: BTreeMap<Path, Value>,
    /// Paths present in the original snapshot only, with their old value
    pub deleted: BTreeMap<Path, Value>,
    /// Leaf paths present in both with different values, with the new value
    pub updated: BTreeMap<Path, Value>,
}

impl Diff {
    /// No differences at all
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Every differing path, in order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.added
            .keys()
            .chain(self.deleted.keys())
            .chain(self.updated.keys())
    }

    /// Whether the value at `expr`, or anything nested under it, changed
    ///
    /// A change to an ancestor of `expr` counts too: replacing `deploy` with a
    /// string affects `deploy.replicas`.
    pub fn affects(&self, expr: &str) -> Result<bool> {
        let target = Path::parse(expr)?;
        Ok(self
            .paths()
            .any(|p| p.is_prefix_of(&target) || target.is_prefix_of(p)))
    }

    /// Total number of differing paths
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.updated.len()
    }
}

/// Compute the structural difference from `original` to `changed`
pub fn diff(original: &Value, changed: &Value) -> Diff {
    let mut out = Diff::default();
    walk(&Path::root(), original, changed, &mut out);
    out
}

/// Whether the value at `expr` differs between two snapshots
///
/// A path missing on one side and present on the other counts as changed.
pub fn changed(original: &Value, changed: &Value, expr: &str) -> Result<bool> {
    let path = Path::parse(expr)?;
    Ok(path.resolve(original) != path.resolve(changed))
}

fn walk(path: &Path, a: &Value, b: &Value, out: &mut Diff) {
    if a == b {
        return;
    }

    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, value) in left {
                match right.get(key) {
                    Some(other) => walk(&path.key(key.as_str()), value, other, out),
                    None => {
                        out.deleted.insert(path.key(key.as_str()), value.clone());
                    }
                }
            }
            for (key, value) in right {
                if !left.contains_key(key) {
                    out.added.insert(path.key(key.as_str()), value.clone());
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for i in 0..left.len().max(right.len()) {
                match (left.get(i), right.get(i)) {
                    (Some(x), Some(y)) => walk(&path.index(i), x, y, out),
                    (Some(x), None) => {
                        out.deleted.insert(path.index(i), x.clone());
                    }
                    (None, Some(y)) => {
                        out.added.insert(path.index(i), y.clone());
                    }
                    (None, None) => {}
                }
            }
        }
        _ => {
            out.updated.insert(path.clone(), b.clone());
        }
    }
}
