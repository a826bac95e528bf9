//! Folder resource - a directory

use anyhow::{Context as _, Result};
use declarative::{Context, DestroyStrategy, HandlerResult, Lifecycle, Provider, ProviderOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderProps {
    /// Directory path; `~` and `$VARS` are expanded
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderOutput {
    pub path: PathBuf,
}

/// Creates a directory and removes it with its contents on delete
pub struct Folder;

impl Provider for Folder {
    const KIND: &'static str = "fs::Folder";
    type Props = FolderProps;
    type Output = FolderOutput;

    fn options(&self) -> ProviderOptions {
        ProviderOptions::default().destroy_strategy(DestroyStrategy::Parallel)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_, FolderOutput>,
        _id: &str,
        props: &FolderProps,
    ) -> HandlerResult<FolderOutput> {
        let path = crate::paths::expand(&props.path);

        match ctx.phase() {
            Lifecycle::Delete => {
                remove_dir(&path)?;
                return ctx.destroy();
            }
            Lifecycle::Update if ctx.changed("path")? => {
                ctx.replace();
                return Ok(FolderOutput { path });
            }
            Lifecycle::Create | Lifecycle::Update => {}
        }

        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        Ok(FolderOutput { path })
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove directory: {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing;
    use declarative::{MemoryStateStore, Phase, Registry, RootOptions, Scope};
    use std::sync::Arc;

    #[test]
    fn test_folders_are_created_and_destroyed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStateStore::new());

        let root = testing::scope(&store, None);
        for name in ["a", "b", "c/d"] {
            let path = dir.path().join(name).to_string_lossy().to_string();
            root.apply::<Folder>(name, &FolderProps { path }).unwrap();
        }
        root.finalize().unwrap();
        assert!(dir.path().join("c/d").is_dir());

        let registry = Arc::new(Registry::new());
        crate::providers::register_builtin(&registry).unwrap();
        let root = Scope::root(
            RootOptions::new("test")
                .app("providers")
                .phase(Phase::Destroy),
            store.clone(),
            registry,
        )
        .unwrap();
        root.finalize().unwrap();

        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("b").exists());
        assert!(!dir.path().join("c/d").exists());
    }

    #[test]
    fn test_removing_a_missing_folder_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_dir(&dir.path().join("never-created")).is_ok());
    }
}
