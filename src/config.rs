//! Run settings resolved from flags, environment and the manifest

use crate::cli::{DeployArgs, TargetArgs};
use crate::manifest::Manifest;
use crate::paths;
use declarative::{Phase, ProgressCallback, RootOptions, ScopePath};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct Settings {
    pub app: String,
    pub stage: String,
    pub state_dir: PathBuf,
    pub password: Option<String>,
    pub destroy_orphans: bool,
    pub jobs: usize,
    pub quiet: bool,
}

impl Settings {
    /// Settings for `target`, without anything only deploys need
    pub fn resolve(target: &TargetArgs, manifest: &Manifest, quiet: bool) -> Self {
        let stage = target
            .stage
            .clone()
            .or_else(|| manifest.stage.clone())
            .unwrap_or_else(paths::default_stage);

        Self {
            app: manifest.app.clone(),
            stage,
            state_dir: paths::state_dir(target.state_dir.as_deref(), &target.manifest),
            password: None,
            destroy_orphans: true,
            jobs: 4,
            quiet,
        }
    }

    /// Apply the deploy-only flags
    pub fn with_deploy(mut self, args: &DeployArgs) -> Self {
        self.password = args.password.clone().filter(|p| !p.is_empty());
        self.destroy_orphans = args.destroy_orphans;
        self.jobs = args.jobs.max(1);
        self
    }

    /// Path of the root scope in the state store
    pub fn root_path(&self) -> ScopePath {
        ScopePath::root(Some(&self.app), &self.stage)
    }

    /// Engine options for a run in `phase`
    pub fn root_options(&self, phase: Phase, progress: Arc<dyn ProgressCallback>) -> RootOptions {
        let mut options = RootOptions::new(&self.stage)
            .app(&self.app)
            .phase(phase)
            .quiet(self.quiet)
            .destroy_orphans(self.destroy_orphans)
            .destroy_jobs(self.jobs)
            .progress(progress);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        options
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app", &self.app)
            .field("stage", &self.stage)
            .field("state_dir", &self.state_dir)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("destroy_orphans", &self.destroy_orphans)
            .field("jobs", &self.jobs)
            .field("quiet", &self.quiet)
            .finish()
    }
}
