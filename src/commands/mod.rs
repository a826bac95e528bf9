//! Command implementations
//!
//! Every command loads the manifest named on the command line, resolves
//! settings, and works against the filesystem state store of that
//! deployment.

pub mod apply;
pub mod destroy;
pub mod rotate;
pub mod status;

use crate::Context;
use crate::cli::{DeployArgs, TargetArgs};
use crate::config::Settings;
use crate::manifest::Manifest;
use crate::providers;
use anyhow::{Context as _, Result};
use declarative::{FileSystemStateStore, Phase, ProgressCallback, Registry, Scope};
use std::sync::Arc;

/// A loaded manifest with its settings and state store
pub struct Deployment {
    pub manifest: Manifest,
    pub settings: Settings,
    pub store: Arc<FileSystemStateStore>,
}

impl Deployment {
    pub fn load(ctx: &Context, target: &TargetArgs) -> Result<Self> {
        let manifest = Manifest::load(&target.manifest)?;
        let settings = Settings::resolve(target, &manifest, ctx.quiet);
        log::debug!("Resolved settings: {:?}", settings);
        let store = Arc::new(FileSystemStateStore::new(&settings.state_dir));
        Ok(Self {
            manifest,
            settings,
            store,
        })
    }

    /// Load the deployment named by deploy arguments
    pub fn load_for_deploy(ctx: &Context, args: &DeployArgs) -> Result<Self> {
        let mut deployment = Self::load(ctx, &args.target)?;
        deployment.settings = deployment.settings.clone().with_deploy(args);
        Ok(deployment)
    }

    /// Root scope of this deployment with the built-in providers registered
    pub fn root(&self, phase: Phase, progress: Arc<dyn ProgressCallback>) -> Result<Scope> {
        let registry = Arc::new(Registry::new());
        providers::register_builtin(&registry).context("Failed to register providers")?;
        Scope::root(
            self.settings.root_options(phase, progress),
            self.store.clone(),
            registry,
        )
        .context("Failed to create root scope")
    }
}
