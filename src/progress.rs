//! Console progress for reconcile runs

use colored::Colorize;
use declarative::{ApplyResult, Lifecycle, ProgressCallback, RunSummary};
use std::sync::{Mutex, PoisonError};

/// Prints one line per completed resource and tallies the outcomes
#[derive(Default)]
pub struct ConsoleProgress {
    verbose: bool,
    summary: Mutex<RunSummary>,
}

impl ConsoleProgress {
    /// With `verbose`, unchanged resources and handler starts are shown too
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            summary: Mutex::new(RunSummary::default()),
        }
    }

    /// Outcomes seen so far
    pub fn summary(&self) -> RunSummary {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_resource_start(&self, fqn: &str, phase: Lifecycle) {
        if self.verbose {
            println!("  {} {}", format!("{}...", phase).dimmed(), fqn.dimmed());
        }
    }

    fn on_resource_complete(&self, fqn: &str, result: &ApplyResult) {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_result(result);

        match result {
            ApplyResult::NoChange => {
                if self.verbose {
                    println!("  {} {}", "=".dimmed(), fqn.dimmed());
                }
            }
            ApplyResult::Created => println!("  {} {}", "+".green(), fqn),
            ApplyResult::Updated => println!("  {} {}", "~".yellow(), fqn),
            ApplyResult::Replaced => println!("  {} {}", "±".magenta(), fqn),
            ApplyResult::Deleted => println!("  {} {}", "-".red(), fqn),
            ApplyResult::Failed { error } => {
                eprintln!("  {} {}: {}", "✗".red(), fqn, error.red());
            }
        }
    }
}

/// One-line description of a run summary
pub fn describe(summary: &RunSummary) -> String {
    let mut parts = Vec::new();
    for (count, label) in [
        (summary.created, "created"),
        (summary.updated, "updated"),
        (summary.replaced, "replaced"),
        (summary.deleted, "deleted"),
        (summary.unchanged, "unchanged"),
        (summary.failed, "failed"),
    ] {
        if count > 0 {
            parts.push(format!("{} {}", count, label));
        }
    }
    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}
