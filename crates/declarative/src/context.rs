//! Handler context and progress reporting
//!
//! [`Context`] is what a provider handler sees of the engine: the phase it
//! runs in, the prior output, the auxiliary data bag, and the two signals
//! (`replace` and `destroy`) it can send back.

use crate::error::{Error, HandlerError, HandlerResult};
use crate::provider::Registry;
use crate::scope::Scope;
use crate::types::{ApplyResult, Lifecycle, State};
use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Progress callback for apply and destroy operations
///
/// Implement this trait to receive progress updates. Calls may arrive from
/// several threads at once during parallel destroys.
pub trait ProgressCallback: Send + Sync {
    /// Called before a handler is invoked
    fn on_resource_start(&self, fqn: &str, phase: Lifecycle);

    /// Called when an operation on a resource completes
    fn on_resource_complete(&self, fqn: &str, result: &ApplyResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&self, _fqn: &str, _phase: Lifecycle) {}
    fn on_resource_complete(&self, _fqn: &str, _result: &ApplyResult) {}
}

/// Engine-side state of one handler invocation
pub(crate) struct Invocation {
    scope: Scope,
    nested: Scope,
    state: State,
    lifecycle: Lifecycle,
    replace: bool,
    persist: bool,
    persist_error: Option<Error>,
}

impl Invocation {
    pub(crate) fn new(scope: &Scope, state: State, lifecycle: Lifecycle, persist: bool) -> Self {
        let nested = scope.nested(&state.id);
        Self {
            scope: scope.clone(),
            nested,
            state,
            lifecycle,
            replace: false,
            persist,
            persist_error: None,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.state.id
    }

    pub(crate) fn prior_output(&self) -> Option<&Value> {
        match self.lifecycle {
            Lifecycle::Create => None,
            Lifecycle::Update | Lifecycle::Delete => self.state.last_output(),
        }
    }

    pub(crate) fn nested(&self) -> &Scope {
        &self.nested
    }

    pub(crate) fn replace_requested(&self) -> bool {
        self.replace
    }

    pub(crate) fn into_state(self) -> State {
        self.state
    }

    /// First persistence failure seen by a data-bag mutation, if any
    pub(crate) fn take_persist_error(&mut self) -> Option<Error> {
        self.persist_error.take()
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        if !self.persist {
            return Ok(());
        }
        let lifecycle = self.lifecycle;
        if let Err(e) = self
            .scope
            .write_state(&self.state)
            .map_err(|e| e.in_phase(lifecycle))
        {
            let message = e.to_string();
            if self.persist_error.is_none() {
                self.persist_error = Some(e);
            }
            anyhow::bail!("failed to persist data for {}: {}", self.state.fqn, message);
        }
        Ok(())
    }
}

/// Handler view of a resource being created, updated or deleted
pub struct Context<'a, O> {
    invocation: &'a mut Invocation,
    output: Option<O>,
}

impl<'a, O> Context<'a, O> {
    pub(crate) fn new(invocation: &'a mut Invocation, output: Option<O>) -> Self {
        Self { invocation, output }
    }

    /// Lifecycle transition being performed
    pub fn phase(&self) -> Lifecycle {
        self.invocation.lifecycle
    }

    pub fn id(&self) -> &str {
        &self.invocation.state.id
    }

    /// Fully qualified name of the resource
    pub fn fqn(&self) -> &str {
        &self.invocation.state.fqn
    }

    /// Output committed by the previous successful create or update
    ///
    /// Always `None` in the create phase.
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    /// Props in effect before this transition, if any
    pub fn old_props<T: DeserializeOwned>(&self) -> anyhow::Result<Option<T>> {
        self.invocation
            .state
            .old_props
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .context("old props do not match the provider's props type")
    }

    /// Whether the value at `path` differs between the old and new props
    ///
    /// `false` when there are no old props (create and delete phases).
    pub fn changed(&self, path: &str) -> anyhow::Result<bool> {
        let state = &self.invocation.state;
        match &state.old_props {
            Some(old) => Ok(diffkit::changed(old, &state.props, path)?),
            None => Ok(false),
        }
    }

    /// Flag that the update cannot happen in place
    ///
    /// The engine replaces the resource once the handler returns. Only
    /// meaningful in the update phase; later calls are ignored.
    pub fn replace(&mut self) {
        if self.invocation.lifecycle != Lifecycle::Update {
            log::warn!(
                "{}: replace() ignored outside the update phase ({})",
                self.fqn(),
                self.invocation.lifecycle
            );
            return;
        }
        if self.invocation.replace {
            log::warn!("{}: replace() called more than once", self.fqn());
            return;
        }
        log::debug!("{}: replacement requested", self.fqn());
        self.invocation.replace = true;
    }

    /// Whether [`replace`](Self::replace) has been called
    pub fn is_replacing(&self) -> bool {
        self.invocation.replace
    }

    /// Abort the handler and have the resource treated as deleted
    pub fn destroy<T>(&self) -> HandlerResult<T> {
        Err(HandlerError::Destroyed)
    }

    /// Read an entry of the auxiliary data bag
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        self.invocation
            .state
            .data
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .with_context(|| format!("data entry '{}' has an unexpected type", key))
    }

    /// Write an entry of the auxiliary data bag and persist it
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("data entry '{}' is not serializable", key))?;
        self.invocation.state.data.insert(key.to_string(), value);
        self.invocation.persist()
    }

    /// Remove an entry of the auxiliary data bag and persist the removal
    pub fn delete(&mut self, key: &str) -> anyhow::Result<Option<Value>> {
        let removed = self.invocation.state.data.remove(key);
        if removed.is_some() {
            self.invocation.persist()?;
        }
        Ok(removed)
    }

    /// Scope for resources this resource declares itself
    pub fn scope(&self) -> &Scope {
        self.invocation.nested()
    }

    /// Registry of providers and secrets
    pub fn registry(&self) -> &Registry {
        self.invocation.scope.registry()
    }
}
