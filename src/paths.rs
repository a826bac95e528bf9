//! Path and stage resolution for reconcile
//!
//! # Environment Variables
//!
//! - `RECONCILE_STATE_DIR` - Override the state directory
//! - `RECONCILE_STAGE` - Override the stage
//!
//! # State Directory Resolution
//!
//! 1. `--state-dir` / `RECONCILE_STATE_DIR`
//! 2. `.reconcile` next to the manifest
//!
//! # Stage Resolution
//!
//! 1. `--stage` / `RECONCILE_STAGE`
//! 2. `stage` in the manifest
//! 3. The OS user (`USER`, then `USERNAME`)
//! 4. `dev`

use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "RECONCILE_STATE_DIR";

/// Directory name used for state when no override is given
pub const STATE_DIR_NAME: &str = ".reconcile";

/// Stage used when nothing else names one
pub const FALLBACK_STAGE: &str = "dev";

/// Resolve the state directory for a manifest
pub fn state_dir(explicit: Option<&str>, manifest: &Path) -> PathBuf {
    if let Some(dir) = explicit {
        let path = expand(dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return path;
    }

    let base = manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let path = base.join(STATE_DIR_NAME);
    log::debug!("Using default state dir: {}", path.display());
    path
}

/// Stage to use when neither the command line nor the manifest names one
pub fn default_stage() -> String {
    stage_from_user(
        std::env::var("USER").ok(),
        std::env::var("USERNAME").ok(),
    )
}

fn stage_from_user(user: Option<String>, username: Option<String>) -> String {
    user.into_iter()
        .chain(username)
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_STAGE.to_string())
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for reconcile. Unknown
/// variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
