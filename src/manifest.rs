//! Deployment manifests
//!
//! A manifest names an app and lists the resources to declare:
//!
//! ```toml
//! app = "site"
//! stage = "prod"            # optional
//!
//! [[resource]]
//! kind = "fs::Folder"
//! id = "public"
//! props = { path = "public" }
//!
//! [[resource]]
//! kind = "fs::File"
//! id = "index"
//! scope = "pages"           # optional, nested with "/"
//! props = { path = "public/index.html", content = "<h1>hi</h1>" }
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// Main Manifest Schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Application name, the first segment of every resource name
    pub app: String,

    /// Stage to deploy when none is given on the command line
    #[serde(default)]
    pub stage: Option<String>,

    /// Resources in declaration order
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    /// Provider kind, e.g. `fs::File`
    pub kind: String,

    /// Id, unique within its scope
    pub id: String,

    /// Child scope path below the stage, segments separated by `/`
    #[serde(default)]
    pub scope: Option<String>,

    /// Provider props
    #[serde(default = "empty_props")]
    pub props: Value,
}

fn empty_props() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Invalid manifest: {}", path.display()))?;
        log::debug!(
            "Loaded manifest {} ({} resources)",
            path.display(),
            manifest.resources.len()
        );
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content).context("Invalid TOML format")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        if self.app.trim().is_empty() {
            bail!("app cannot be empty");
        }
        if self.stage.as_deref().is_some_and(|s| s.trim().is_empty()) {
            bail!("stage cannot be empty");
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            resource
                .validate()
                .with_context(|| format!("Invalid resource '{}'", resource.id))?;
            if !seen.insert((resource.scope_segments(), resource.id.as_str())) {
                bail!(
                    "Resource '{}' is declared twice in scope '{}'",
                    resource.id,
                    resource.scope.as_deref().unwrap_or("")
                );
            }
        }
        Ok(())
    }
}

impl ResourceDecl {
    /// Scope path segments below the stage; empty for the stage itself
    pub fn scope_segments(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split('/').filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Validate the resource declaration
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            bail!("kind cannot be empty");
        }
        if self.id.is_empty() {
            bail!("id cannot be empty");
        }
        if let Some(scope) = &self.scope
            && scope.split('/').all(str::is_empty)
        {
            bail!("scope '{}' names no segment", scope);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
