//! `reconcile rotate-password` - re-encrypt stored secrets

use super::Deployment;
use crate::Context;
use crate::cli::RotateArgs;
use crate::ui;
use anyhow::{Context as _, Result};
use declarative::rotate_password;

pub fn run(ctx: &Context, args: &RotateArgs) -> Result<()> {
    let deployment = Deployment::load(ctx, &args.target)?;
    let root_path = deployment.settings.root_path();

    let summary = rotate_password(deployment.store.as_ref(), &root_path, &args.old, &args.new)
        .with_context(|| format!("Failed to rotate the password of {}", root_path))?;

    if !ctx.quiet {
        ui::success(&format!("Rotated the password of {}", root_path));
        ui::kv("Records scanned", &summary.records_scanned.to_string());
        ui::kv("Records rewritten", &summary.records_rewritten.to_string());
        ui::kv("Secrets rotated", &summary.secrets_rotated.to_string());
    }
    Ok(())
}
