//! Destroying scopes and pruning orphans
//!
//! Resources in a scope are torn down in reverse creation order. Runs of
//! adjacent resources whose provider uses [`DestroyStrategy::Parallel`] are
//! deleted together on a bounded thread pool; everything else goes one at a
//! time. A resource's nested scope is always destroyed before the resource.

use crate::apply;
use crate::error::{Error, Result};
use crate::provider::DynProvider;
use crate::scope::Scope;
use crate::types::{ApplyResult, DestroyStrategy, Lifecycle, State, Status};
use rayon::prelude::*;
use std::sync::{Arc, PoisonError};

/// Destroy every resource and child scope under `scope`, then drop the scope
pub(crate) fn destroy_scope(scope: &Scope) -> Result<()> {
    let records: Vec<State> = scope.states().map_err(deleting)?.into_values().collect();
    if !records.is_empty() {
        log::info!("Destroying {} resources in {}", records.len(), scope.path());
    }
    destroy_records(scope, records)?;

    for child in scope.store().children(scope.path())? {
        destroy_scope(&scope.nested(&child))?;
    }
    scope.store().remove_scope(scope.path())
}

/// Destroy what an earlier run left in `scope` and this run did not declare
pub(crate) fn prune_orphans(scope: &Scope) -> Result<()> {
    if !scope.destroy_orphans() {
        log::debug!("Orphan pruning disabled; keeping leftovers in {}", scope.path());
        return Ok(());
    }

    let mut orphans = Vec::new();
    for (id, state) in scope.store().all(scope.path())? {
        if !scope.is_declared(&id) {
            orphans.push(scope.unseal(state).map_err(deleting)?);
        }
    }
    if !orphans.is_empty() {
        log::info!("Pruning {} orphaned resources in {}", orphans.len(), scope.path());
    }
    destroy_records(scope, orphans)?;

    for child in scope.store().children(scope.path())? {
        if scope.is_declared(&child) || scope.was_entered(&child) {
            continue;
        }
        log::info!("Pruning orphaned scope {}", scope.path().child(&child));
        destroy_scope(&scope.nested(&child))?;
    }
    Ok(())
}

/// Delete resources that replacements in `scope` left behind
pub(crate) fn delete_retired(scope: &Scope) -> Result<()> {
    for (id, raw) in scope.store().all(scope.path())? {
        if raw.retired.is_empty() {
            continue;
        }

        let lock = scope.lock(&id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut state) = scope.read_state(&id).map_err(deleting)? else {
            continue;
        };
        let provider = scope.registry().provider(&state.kind)?;
        while let Some(entry) = state.retired.first().cloned() {
            apply::delete_retired(scope, provider.as_ref(), &state, &entry)?;
            state.retired.remove(0);
            scope.write_state(&state).map_err(deleting)?;
        }
    }
    Ok(())
}

fn deleting(err: Error) -> Error {
    err.in_phase(Lifecycle::Delete)
}

fn destroy_records(scope: &Scope, mut records: Vec<State>) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    records.sort_by(|a, b| b.seq.cmp(&a.seq));

    // Resolve every provider first so a missing one fails before any delete
    let mut resolved = Vec::with_capacity(records.len());
    for state in records {
        let provider = scope.registry().provider(&state.kind)?;
        resolved.push((state, provider));
    }

    let mut batch: Vec<(State, Arc<dyn DynProvider>)> = Vec::new();
    for (state, provider) in resolved {
        if provider.options().destroy_strategy == DestroyStrategy::Parallel {
            batch.push((state, provider));
            continue;
        }
        destroy_batch(scope, std::mem::take(&mut batch))?;
        destroy_resource(scope, provider.as_ref(), state)?;
    }
    destroy_batch(scope, batch)
}

fn destroy_batch(scope: &Scope, batch: Vec<(State, Arc<dyn DynProvider>)>) -> Result<()> {
    if batch.len() <= 1 {
        for (state, provider) in batch {
            destroy_resource(scope, provider.as_ref(), state)?;
        }
        return Ok(());
    }

    let jobs = scope.destroy_jobs().min(batch.len());
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool,
        Err(e) => {
            log::warn!("Failed to create thread pool ({}); destroying sequentially", e);
            for (state, provider) in batch {
                destroy_resource(scope, provider.as_ref(), state)?;
            }
            return Ok(());
        }
    };

    log::debug!("Destroying {} resources on {} threads", batch.len(), jobs);
    let results: Vec<Result<()>> = pool.install(|| {
        batch
            .into_par_iter()
            .map(|(state, provider)| destroy_resource(scope, provider.as_ref(), state))
            .collect()
    });
    results.into_iter().collect()
}

/// Delete one resource: nested scope, retired leftovers, then the resource
fn destroy_resource(scope: &Scope, provider: &dyn DynProvider, mut state: State) -> Result<()> {
    let fqn = state.fqn.clone();
    let lock = scope.lock(&state.id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    destroy_scope(&scope.nested(&state.id))?;

    for entry in std::mem::take(&mut state.retired) {
        apply::delete_retired(scope, provider, &state, &entry)?;
    }

    state.status = Status::Deleting;
    state.park_output();
    scope.write_state(&state).map_err(deleting)?;
    scope.report_start(&fqn, Lifecycle::Delete);

    let id = state.id.clone();
    if let Err(e) = apply::delete(scope, provider, state, true) {
        scope.report_complete(
            &fqn,
            &ApplyResult::Failed {
                error: e.to_string(),
            },
        );
        return Err(e);
    }

    scope.delete_state(&id)?;
    log::info!("{}: deleted", fqn);
    scope.report_complete(&fqn, &ApplyResult::Deleted);
    Ok(())
}
