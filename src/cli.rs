use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile declared resources against persisted state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true, env = "RECONCILE_QUIET")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update declared resources and prune the rest
    Apply(DeployArgs),

    /// Destroy every resource of the deployment
    Destroy(DeployArgs),

    /// Show persisted resources against the manifest
    Status(TargetArgs),

    /// Re-encrypt stored secrets under a new password
    RotatePassword(RotateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

/// Which deployment to operate on
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Deployment manifest (TOML)
    pub manifest: PathBuf,

    /// Stage to operate on (defaults to the manifest's stage, then the OS user)
    #[arg(short, long, env = "RECONCILE_STAGE")]
    pub stage: Option<String>,

    /// Directory holding persisted state (defaults to .reconcile next to the manifest)
    #[arg(long, env = "RECONCILE_STATE_DIR")]
    pub state_dir: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Password used to encrypt secrets in state
    #[arg(long, env = "RECONCILE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Destroy resources an earlier run created and this one no longer declares
    #[arg(
        long,
        env = "RECONCILE_DESTROY_ORPHANS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub destroy_orphans: bool,

    /// Number of parallel jobs for destroys
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RotateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Current password
    #[arg(long, env = "RECONCILE_PASSWORD", hide_env_values = true)]
    pub old: String,

    /// New password
    #[arg(long)]
    pub new: String,
}
