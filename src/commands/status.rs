//! `reconcile status` - persisted resources against the manifest

use super::Deployment;
use crate::Context;
use crate::cli::TargetArgs;
use crate::manifest::Manifest;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use declarative::{ScopePath, State, StateStore, Status};
use std::collections::HashSet;

/// How a resource relates to the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Declared and persisted
    Tracked,
    /// Persisted by a resource's handler below a declared resource
    Nested,
    /// Declared but never persisted
    Pending,
    /// Persisted but no longer declared; the next apply deletes it
    Orphan,
}

#[derive(Debug)]
pub struct Row {
    pub fqn: String,
    pub kind: String,
    pub status: Option<Status>,
    pub standing: Standing,
}

pub fn run(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let deployment = Deployment::load(ctx, args)?;
    let root_path = deployment.settings.root_path();
    let rows = collect(
        deployment.store.as_ref(),
        &root_path,
        &deployment.manifest,
    )?;

    ui::header(&format!("Status of {}", root_path));
    ui::kv("State", &deployment.settings.state_dir.display().to_string());

    if rows.is_empty() {
        ui::info("No resources declared or persisted");
        return Ok(());
    }

    println!();
    for row in &rows {
        let (icon, note) = match row.standing {
            Standing::Tracked if row.status.is_some_and(Status::is_settled) => {
                ("✓".green(), String::new())
            }
            Standing::Tracked => ("⚠".yellow(), "interrupted".to_string()),
            Standing::Nested => ("·".dimmed(), "nested".to_string()),
            Standing::Pending => ("+".green(), "pending".to_string()),
            Standing::Orphan => ("-".red(), "orphan".to_string()),
        };
        let status = row
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} {} {}",
            icon,
            row.fqn.bold(),
            format!("[{} {}]", row.kind, status).dimmed(),
            note.dimmed()
        );
    }

    let count = |standing| rows.iter().filter(|r| r.standing == standing).count();
    println!();
    ui::dim(&format!(
        "{} tracked, {} nested, {} pending, {} orphaned",
        count(Standing::Tracked),
        count(Standing::Nested),
        count(Standing::Pending),
        count(Standing::Orphan)
    ));
    if count(Standing::Orphan) > 0 {
        ui::warn("Orphaned resources are deleted by the next apply");
    }
    Ok(())
}

/// Compare every persisted record under `root` with the manifest
///
/// Records are read as stored; secrets stay encrypted, so no password is
/// needed.
pub fn collect(store: &dyn StateStore, root: &ScopePath, manifest: &Manifest) -> Result<Vec<Row>> {
    let declared: Vec<String> = manifest
        .resources
        .iter()
        .map(|r| {
            let mut path = root.clone();
            for segment in r.scope_segments() {
                path = path.child(segment);
            }
            path.fqn(&r.id)
        })
        .collect();
    let declared_set: HashSet<&str> = declared.iter().map(String::as_str).collect();

    let mut records = Vec::new();
    walk(store, root, &mut records)?;

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for state in records {
        let standing = if declared_set.contains(state.fqn.as_str()) {
            Standing::Tracked
        } else if declared
            .iter()
            .any(|fqn| state.fqn.starts_with(&format!("{}/", fqn)))
        {
            Standing::Nested
        } else {
            Standing::Orphan
        };
        seen.insert(state.fqn.clone());
        rows.push(Row {
            fqn: state.fqn,
            kind: state.kind,
            status: Some(state.status),
            standing,
        });
    }

    for (fqn, resource) in declared.iter().zip(&manifest.resources) {
        if !seen.contains(fqn) {
            rows.push(Row {
                fqn: fqn.clone(),
                kind: resource.kind.clone(),
                status: None,
                standing: Standing::Pending,
            });
        }
    }

    rows.sort_by(|a, b| a.fqn.cmp(&b.fqn));
    Ok(rows)
}

fn walk(store: &dyn StateStore, scope: &ScopePath, out: &mut Vec<State>) -> Result<()> {
    out.extend(store.all(scope)?.into_values());
    for child in store.children(scope)? {
        walk(store, &scope.child(&child), out)?;
    }
    Ok(())
}
