//! File resource - a file with literal content

use anyhow::{Context as _, Result};
use declarative::{Context, HandlerResult, Lifecycle, Provider};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileProps {
    /// Where the file lives; `~` and `$VARS` are expanded
    pub path: String,

    /// File content
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutput {
    /// Expanded path of the file
    pub path: PathBuf,
    /// Bytes written
    pub size: usize,
}

/// Writes `content` to `path`; moving the file replaces the resource
pub struct File;

impl Provider for File {
    const KIND: &'static str = "fs::File";
    type Props = FileProps;
    type Output = FileOutput;

    fn handle(
        &self,
        ctx: &mut Context<'_, FileOutput>,
        _id: &str,
        props: &FileProps,
    ) -> HandlerResult<FileOutput> {
        let path = crate::paths::expand(&props.path);

        match ctx.phase() {
            Lifecycle::Delete => {
                remove_file(&path)?;
                return ctx.destroy();
            }
            Lifecycle::Update if ctx.changed("path")? => {
                // The new file is written by the create that follows
                ctx.replace();
                return Ok(FileOutput { path, size: 0 });
            }
            Lifecycle::Create | Lifecycle::Update => {}
        }

        write_file(&path, &props.content)?;
        Ok(FileOutput {
            path,
            size: props.content.len(),
        })
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("{} already gone", path.display());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
