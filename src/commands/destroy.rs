//! `reconcile destroy` - delete every resource of a deployment

use super::Deployment;
use crate::Context;
use crate::cli::DeployArgs;
use crate::progress::{self, ConsoleProgress};
use crate::ui;
use anyhow::{Context as _, Result};
use declarative::{Phase, StateStore};
use std::sync::Arc;

pub fn run(ctx: &Context, args: &DeployArgs) -> Result<()> {
    let deployment = Deployment::load_for_deploy(ctx, args)?;
    let root_path = deployment.settings.root_path();

    let store: &dyn StateStore = deployment.store.as_ref();
    if store.count(&root_path)? == 0 && store.children(&root_path)?.is_empty() {
        if !ctx.quiet {
            ui::info(&format!("Nothing to destroy in {}", root_path));
        }
        return Ok(());
    }

    let progress = Arc::new(ConsoleProgress::new(ctx.verbose > 0));
    let root = deployment.root(Phase::Destroy, progress.clone())?;
    if !ctx.quiet {
        ui::header(&format!("Destroying {}", root.path()));
    }

    // In the destroy phase the root tears down its whole tree when finalized
    root.finalize()
        .with_context(|| format!("Failed to destroy {}", root_path))?;

    if !ctx.quiet {
        ui::success(&progress::describe(&progress.summary()));
    }
    Ok(())
}
