//! Apply engine
//!
//! Drives one resource through its lifecycle:
//!
//! 1. In the read and destroy phases, return the stored output untouched.
//! 2. If the record is settled and the props are unchanged, skip.
//! 3. Otherwise persist `creating`/`updating` before the handler runs, so a
//!    crash leaves a record the next run resumes from.
//! 4. Invoke the handler; commit `created`/`updated` with its output, or
//!    carry out a replacement if the handler asked for one.

use crate::context::Invocation;
use crate::error::{Error, HandlerError, Result};
use crate::provider::DynProvider;
use crate::scope::Scope;
use crate::types::{
    ApplyOptions, ApplyResult, Lifecycle, Phase, ReplaceStrategy, Retired, State, Status,
};
use serde_json::{Map, Value};
use std::sync::PoisonError;

pub(crate) fn apply(
    scope: &Scope,
    kind: &str,
    id: &str,
    props: Value,
    options: ApplyOptions,
) -> Result<Value> {
    if id.is_empty() {
        return Err(Error::InvalidScope(format!(
            "empty resource id in {}",
            scope.path()
        )));
    }

    let fqn = scope.fqn(id);
    let provider = scope.registry().provider(kind)?;
    scope.declare(id, kind)?;

    let lock = scope.lock(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let existing = scope.read_state(id)?;
    if let Some(state) = &existing
        && state.kind != kind
    {
        return Err(Error::KindMismatch {
            fqn,
            existing: state.kind.clone(),
            requested: kind.to_string(),
        });
    }

    if matches!(scope.phase(), Phase::Read | Phase::Destroy) {
        return existing
            .and_then(|state| state.last_output().cloned())
            .ok_or(Error::NotFound { fqn });
    }

    let provider_options = provider.options();
    let mut state = match existing {
        Some(state) => state,
        None => State::new(kind, id, fqn.clone(), scope.next_seq()?, props.clone()),
    };

    if state.status.is_settled()
        && state.props == props
        && !provider_options.always_update
        && !options.force
    {
        log::debug!("{}: unchanged", fqn);
        scope.report_complete(&fqn, &ApplyResult::NoChange);
        return Ok(state.output.unwrap_or(Value::Null));
    }

    let lifecycle = if state.status == Status::Creating {
        Lifecycle::Create
    } else {
        Lifecycle::Update
    };

    // A retried update keeps the props from before the interrupted attempt
    if lifecycle == Lifecycle::Update && !state.status.is_in_progress() {
        state.old_props = Some(std::mem::replace(&mut state.props, props.clone()));
        state.park_output();
    } else {
        state.props = props.clone();
    }
    state.status = match lifecycle {
        Lifecycle::Create => Status::Creating,
        _ => Status::Updating,
    };
    scope
        .write_state(&state)
        .map_err(|e| e.in_phase(lifecycle))?;

    log::info!("{}: {}", fqn, lifecycle);
    scope.report_start(&fqn, lifecycle);

    let result = run_handler(
        scope,
        provider.as_ref(),
        state,
        lifecycle,
        &props,
        provider_options.replace_strategy,
    );

    match &result {
        Ok((_, outcome)) => scope.report_complete(&fqn, outcome),
        Err(e) if e.is_signal() => {}
        Err(e) => scope.report_complete(
            &fqn,
            &ApplyResult::Failed {
                error: e.to_string(),
            },
        ),
    }
    result.map(|(output, _)| output)
}

fn run_handler(
    scope: &Scope,
    provider: &dyn DynProvider,
    state: State,
    lifecycle: Lifecycle,
    props: &Value,
    strategy: ReplaceStrategy,
) -> Result<(Value, ApplyResult)> {
    let (output, invocation) = invoke(scope, provider, state, lifecycle, props, true)?;

    if invocation.replace_requested() {
        let output = replace(scope, provider, invocation.into_state(), props, strategy)?;
        return Ok((output, ApplyResult::Replaced));
    }

    let outcome = match lifecycle {
        Lifecycle::Create => ApplyResult::Created,
        _ => ApplyResult::Updated,
    };
    Ok((commit(scope, invocation, output, lifecycle)?, outcome))
}

/// Swap the resource for a freshly created one
///
/// The old resource is recorded in `retired` before anything else happens,
/// so it is deleted eventually even if this run is interrupted.
fn replace(
    scope: &Scope,
    provider: &dyn DynProvider,
    current: State,
    props: &Value,
    strategy: ReplaceStrategy,
) -> Result<Value> {
    log::info!("{}: replacing ({:?})", current.fqn, strategy);

    let old = Retired {
        props: current.old_props.clone().unwrap_or_else(|| current.props.clone()),
        output: current.last_output().cloned(),
        data: current.data.clone(),
    };

    let mut fresh = State {
        status: Status::Creating,
        props: props.clone(),
        old_props: None,
        output: None,
        old_output: None,
        data: Map::new(),
        ..current
    };
    fresh.retired.push(old.clone());
    scope
        .write_state(&fresh)
        .map_err(|e| e.in_phase(Lifecycle::Create))?;

    if strategy == ReplaceStrategy::DeleteBeforeCreate {
        delete_retired(scope, provider, &fresh, &old)?;
        fresh.retired.pop();
        scope
            .write_state(&fresh)
            .map_err(|e| e.in_phase(Lifecycle::Create))?;
    }

    let (output, invocation) = invoke(scope, provider, fresh, Lifecycle::Create, props, true)?;
    commit(scope, invocation, output, Lifecycle::Create)
}

/// Settle the record with the handler's output
fn commit(
    scope: &Scope,
    invocation: Invocation,
    output: Value,
    lifecycle: Lifecycle,
) -> Result<Value> {
    // Resources the handler stopped declaring go away with this transition
    invocation.nested().finalize()?;

    let mut state = invocation.into_state();
    state.status = match lifecycle {
        Lifecycle::Create => Status::Created,
        _ => Status::Updated,
    };
    state.output = Some(output.clone());
    state.old_output = None;
    state.old_props = None;
    scope
        .write_state(&state)
        .map_err(|e| e.in_phase(lifecycle))?;
    Ok(output)
}

/// Invoke a handler and translate its result into engine errors
fn invoke(
    scope: &Scope,
    provider: &dyn DynProvider,
    state: State,
    lifecycle: Lifecycle,
    props: &Value,
    persist: bool,
) -> Result<(Value, Invocation)> {
    let fqn = state.fqn.clone();
    log::trace!("{}: {} handler, phase {}", fqn, provider.kind(), lifecycle);
    let mut invocation = Invocation::new(scope, state, lifecycle, persist);
    let result = provider.invoke(&mut invocation, props);

    // A failed data-bag write aborts the apply whatever the handler did
    if let Some(err) = invocation.take_persist_error() {
        return Err(err);
    }

    match result {
        Ok(output) => Ok((output, invocation)),
        Err(HandlerError::Destroyed) => Err(Error::Destroyed { fqn }),
        Err(HandlerError::Failed(source)) => Err(Error::Handler {
            fqn,
            phase: lifecycle,
            source,
        }),
    }
}

/// Run the delete phase for `state`
///
/// The handler finishing normally and the handler calling `destroy()` both
/// count as success.
pub(crate) fn delete(
    scope: &Scope,
    provider: &dyn DynProvider,
    state: State,
    persist: bool,
) -> Result<()> {
    let props = state.props.clone();
    match invoke(scope, provider, state, Lifecycle::Delete, &props, persist) {
        Ok(_) | Err(Error::Destroyed { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Run the delete phase for a resource retired by a replacement
pub(crate) fn delete_retired(
    scope: &Scope,
    provider: &dyn DynProvider,
    owner: &State,
    entry: &Retired,
) -> Result<()> {
    log::info!("{}: deleting replaced resource", owner.fqn);
    let doomed = State {
        status: Status::Deleting,
        props: entry.props.clone(),
        old_props: None,
        output: None,
        old_output: entry.output.clone(),
        data: entry.data.clone(),
        retired: Vec::new(),
        ..owner.clone()
    };
    delete(scope, provider, doomed, false)
}
