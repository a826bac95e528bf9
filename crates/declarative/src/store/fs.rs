//! Filesystem state store
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<app>/<stage>/<scope>.../<id>.json   one record per resource
//! <root>/<app>/<stage>/.salt                  metadata entries are dotfiles
//! ```
//!
//! Names are escaped so that any id maps to a single path component and
//! back: `%`, `/` and `\` are percent-encoded, as is a leading `.` so that
//! no record or scope can collide with a metadata file.

use super::{ScopePath, StateStore};
use crate::error::{Error, Result};
use crate::types::State;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

const RECORD_EXT: &str = ".json";

/// [`StateStore`] backed by one pretty-printed JSON file per resource
#[derive(Debug, Clone)]
pub struct FileSystemStateStore {
    root: PathBuf,
}

impl FileSystemStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory every scope lives under
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: &ScopePath) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in scope.segments() {
            dir.push(encode(segment));
        }
        dir
    }

    fn record_path(&self, scope: &ScopePath, id: &str) -> PathBuf {
        self.scope_dir(scope).join(format!("{}{}", encode(id), RECORD_EXT))
    }

    fn meta_path(&self, scope: &ScopePath, key: &str) -> PathBuf {
        self.scope_dir(scope).join(format!(".{}", encode(key)))
    }

    /// Direct entries of a scope directory; empty if it does not exist
    fn entries(&self, scope: &ScopePath) -> Result<Vec<walkdir::DirEntry>> {
        let dir = self.scope_dir(scope);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                Error::io(
                    format!("Failed to scan state directory {}", dir.display()),
                    e.into(),
                )
            })?;
            // Metadata and in-flight temp files
            if !is_hidden(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

impl StateStore for FileSystemStateStore {
    fn get(&self, scope: &ScopePath, id: &str) -> Result<Option<State>> {
        read_record(&self.record_path(scope, id))
    }

    fn set(&self, scope: &ScopePath, id: &str, state: &State) -> Result<()> {
        let path = self.record_path(scope, id);
        let content = serde_json::to_vec_pretty(state).map_err(|source| Error::CorruptState {
            location: path.display().to_string(),
            source,
        })?;
        write_atomic(&path, &content)?;
        log::trace!("Wrote state {}", path.display());
        Ok(())
    }

    fn delete(&self, scope: &ScopePath, id: &str) -> Result<()> {
        let path = self.record_path(scope, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(
                format!("Failed to delete state file {}", path.display()),
                e,
            )),
        }
    }

    fn all(&self, scope: &ScopePath) -> Result<BTreeMap<String, State>> {
        let mut records = BTreeMap::new();
        for entry in self.entries(scope)? {
            let is_record = entry.file_type().is_file()
                && entry.file_name().to_string_lossy().ends_with(RECORD_EXT);
            if !is_record {
                continue;
            }
            if let Some(state) = read_record(entry.path())? {
                records.insert(state.id.clone(), state);
            }
        }
        Ok(records)
    }

    fn children(&self, scope: &ScopePath) -> Result<Vec<String>> {
        Ok(self
            .entries(scope)?
            .into_iter()
            .filter(|e| e.file_type().is_dir())
            .map(|e| decode(&e.file_name().to_string_lossy()))
            .collect())
    }

    fn remove_scope(&self, scope: &ScopePath) -> Result<()> {
        let dir = self.scope_dir(scope);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::debug!("Removed state directory {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(
                format!("Failed to remove state directory {}", dir.display()),
                e,
            )),
        }
    }

    fn get_meta(&self, scope: &ScopePath, key: &str) -> Result<Option<String>> {
        let path = self.meta_path(scope, key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!("Failed to read {}", path.display()), e)),
        }
    }

    fn set_meta(&self, scope: &ScopePath, key: &str, value: &str) -> Result<()> {
        write_atomic(&self.meta_path(scope, key), value.as_bytes())
    }
}

fn read_record(path: &Path) -> Result<Option<State>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::io(
                format!("Failed to read state file {}", path.display()),
                e,
            ));
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| Error::CorruptState {
            location: path.display().to_string(),
            source,
        })
}

/// Write through a temp file in the same directory, then rename over `path`
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| {
        Error::io(
            format!("Failed to create state directory {}", dir.display()),
            e,
        )
    })?;

    let context = || format!("Failed to write {}", path.display());
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(context(), e))?;
    tmp.write_all(content).map_err(|e| Error::io(context(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(context(), e))?;
    tmp.persist(path).map_err(|e| Error::io(context(), e.error))?;
    Ok(())
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '.' if i == 0 => out.push_str("%2E"),
            _ => out.push(c),
        }
    }
    out
}

fn decode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let decoded = match rest.get(pos + 1..pos + 3) {
            Some("25") => Some('%'),
            Some("2F") => Some('/'),
            Some("5C") => Some('\\'),
            Some("2E") => Some('.'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[pos + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}
