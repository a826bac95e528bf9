//! In-memory state store, for tests and dry runs

use super::{ScopePath, StateStore};
use crate::error::Result;
use crate::types::State;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Entry {
    records: BTreeMap<String, State>,
    meta: BTreeMap<String, String>,
}

/// Process-local [`StateStore`]; contents vanish with the value
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    scopes: Mutex<BTreeMap<ScopePath, Entry>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ScopePath, Entry>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, scope: &ScopePath, id: &str) -> Result<Option<State>> {
        Ok(self
            .lock()
            .get(scope)
            .and_then(|entry| entry.records.get(id))
            .cloned())
    }

    fn set(&self, scope: &ScopePath, id: &str, state: &State) -> Result<()> {
        self.lock()
            .entry(scope.clone())
            .or_default()
            .records
            .insert(id.to_string(), state.clone());
        Ok(())
    }

    fn delete(&self, scope: &ScopePath, id: &str) -> Result<()> {
        if let Some(entry) = self.lock().get_mut(scope) {
            entry.records.remove(id);
        }
        Ok(())
    }

    fn all(&self, scope: &ScopePath) -> Result<BTreeMap<String, State>> {
        Ok(self
            .lock()
            .get(scope)
            .map(|entry| entry.records.clone())
            .unwrap_or_default())
    }

    fn children(&self, scope: &ScopePath) -> Result<Vec<String>> {
        let depth = scope.segments().len();
        let mut names: Vec<String> = self
            .lock()
            .keys()
            .filter(|path| scope.is_ancestor_of(path))
            .filter_map(|path| path.segments().get(depth).cloned())
            .collect();
        names.dedup();
        Ok(names)
    }

    fn remove_scope(&self, scope: &ScopePath) -> Result<()> {
        self.lock()
            .retain(|path, _| path != scope && !scope.is_ancestor_of(path));
        Ok(())
    }

    fn get_meta(&self, scope: &ScopePath, key: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .get(scope)
            .and_then(|entry| entry.meta.get(key))
            .cloned())
    }

    fn set_meta(&self, scope: &ScopePath, key: &str, value: &str) -> Result<()> {
        self.lock()
            .entry(scope.clone())
            .or_default()
            .meta
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
