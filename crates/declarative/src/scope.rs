//! Hierarchical deployment scopes
//!
//! A [`Scope`] is a cheap handle to one node of the scope tree. The root
//! holds the deployment-wide settings (app, stage, phase, store, registry,
//! password); every child inherits them and adds a name to the chain.
//! Resources are applied through a scope, and a scope finalizes by pruning
//! whatever it owned in the previous run and did not declare in this one.

use crate::apply;
use crate::context::{NoProgress, ProgressCallback};
use crate::destroy;
use crate::error::{Error, Result};
use crate::provider::{Provider, Registry};
use crate::store::{ScopePath, StateStore};
use crate::types::{ApplyOptions, ApplyResult, Lifecycle, Phase, State};
use secretkit::{Cipher, Salt, Secret};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub(crate) const SALT_KEY: &str = "salt";

thread_local! {
    static CURRENT: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

/// Settings for a root scope
#[derive(Clone)]
pub struct RootOptions {
    pub app: Option<String>,
    pub stage: String,
    /// Password protecting secrets at rest
    pub password: Option<String>,
    /// Suppress progress reporting
    pub quiet: bool,
    pub phase: Phase,
    /// Destroy previously created resources that a run no longer declares
    pub destroy_orphans: bool,
    /// Upper bound on concurrent deletes for parallel destroy strategies
    pub destroy_jobs: usize,
    pub progress: Arc<dyn ProgressCallback>,
}

impl RootOptions {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            app: None,
            stage: stage.into(),
            password: None,
            quiet: false,
            phase: Phase::Up,
            destroy_orphans: true,
            destroy_jobs: 4,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn destroy_orphans(mut self, destroy_orphans: bool) -> Self {
        self.destroy_orphans = destroy_orphans;
        self
    }

    pub fn destroy_jobs(mut self, jobs: usize) -> Self {
        self.destroy_jobs = jobs.max(1);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

impl fmt::Debug for RootOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootOptions")
            .field("app", &self.app)
            .field("stage", &self.stage)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("quiet", &self.quiet)
            .field("phase", &self.phase)
            .field("destroy_orphans", &self.destroy_orphans)
            .field("destroy_jobs", &self.destroy_jobs)
            .finish_non_exhaustive()
    }
}

/// Per-child overrides of inherited settings
#[derive(Clone, Default)]
pub struct RunOptions {
    pub password: Option<String>,
    pub quiet: Option<bool>,
}

impl RunOptions {
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = Some(quiet);
        self
    }
}

/// Deployment-wide state shared by every scope of one tree
struct Shared {
    registry: Arc<Registry>,
    store: Arc<dyn StateStore>,
    progress: Arc<dyn ProgressCallback>,
    phase: Phase,
    destroy_orphans: bool,
    destroy_jobs: usize,
    root: ScopePath,
    salt: Mutex<Option<Salt>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// A password and the cipher derived from it, derived on first use
struct Keys {
    password: Option<String>,
    cipher: Mutex<Option<Cipher>>,
}

impl Keys {
    fn new(password: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            password,
            cipher: Mutex::new(None),
        })
    }
}

struct ScopeInner {
    name: Option<String>,
    app: Option<String>,
    stage: String,
    path: ScopePath,
    parent: Option<Weak<ScopeInner>>,
    shared: Arc<Shared>,
    keys: Arc<Keys>,
    quiet: bool,
    /// Resource id to kind, for every resource applied this run
    declared: Mutex<BTreeMap<String, String>>,
    /// Child scopes entered with `run` this run
    entered: Mutex<BTreeSet<String>>,
    next_seq: Mutex<Option<u64>>,
    errored: AtomicBool,
    interrupted: AtomicBool,
    finalized: AtomicBool,
}

/// Handle to a node of the scope tree
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

/// Keeps a scope current on this thread until dropped
pub struct ScopeGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|stack| stack.borrow_mut().pop());
    }
}

impl Scope {
    /// Create the root scope of a deployment
    pub fn root(
        options: RootOptions,
        store: Arc<dyn StateStore>,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        if options.stage.is_empty() {
            return Err(Error::InvalidScope("stage must not be empty".into()));
        }
        if options.app.as_deref() == Some("") {
            return Err(Error::InvalidScope("app name must not be empty".into()));
        }

        let path = ScopePath::root(options.app.as_deref(), &options.stage);
        log::debug!("Root scope {} ({} phase)", path, options.phase);

        let shared = Arc::new(Shared {
            registry,
            store,
            progress: options.progress,
            phase: options.phase,
            destroy_orphans: options.destroy_orphans,
            destroy_jobs: options.destroy_jobs.max(1),
            root: path.clone(),
            salt: Mutex::new(None),
            locks: Mutex::new(HashMap::new()),
        });

        Ok(Self::from_parts(
            None,
            options.app,
            options.stage,
            path,
            None,
            shared,
            Keys::new(options.password),
            options.quiet,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        name: Option<String>,
        app: Option<String>,
        stage: String,
        path: ScopePath,
        parent: Option<Weak<ScopeInner>>,
        shared: Arc<Shared>,
        keys: Arc<Keys>,
        quiet: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                app,
                stage,
                path,
                parent,
                shared,
                keys,
                quiet,
                declared: Mutex::new(BTreeMap::new()),
                entered: Mutex::new(BTreeSet::new()),
                next_seq: Mutex::new(None),
                errored: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Create a named child scope
    ///
    /// The child inherits app, stage, phase and store; password and quiet
    /// are inherited unless overridden.
    pub fn child(&self, name: &str, options: RunOptions) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidScope(format!(
                "child of {} requires a name",
                self.path()
            )));
        }

        let keys = match options.password {
            Some(password) => Keys::new(Some(password)),
            None => Arc::clone(&self.inner.keys),
        };

        Ok(Self::from_parts(
            Some(name.to_string()),
            self.inner.app.clone(),
            self.inner.stage.clone(),
            self.inner.path.child(name),
            Some(Arc::downgrade(&self.inner)),
            Arc::clone(&self.inner.shared),
            keys,
            options.quiet.unwrap_or(self.inner.quiet),
        ))
    }

    /// Scope for resources declared by the handler of resource `id`
    pub(crate) fn nested(&self, id: &str) -> Self {
        Self::from_parts(
            Some(id.to_string()),
            self.inner.app.clone(),
            self.inner.stage.clone(),
            self.inner.path.child(id),
            Some(Arc::downgrade(&self.inner)),
            Arc::clone(&self.inner.shared),
            Arc::clone(&self.inner.keys),
            self.inner.quiet,
        )
    }

    /// Run `f` inside a new child scope, then finalize the child
    ///
    /// On success the child prunes its orphans. If `f` fails with
    /// [`Error::Destroyed`] the child scope is destroyed and the caller gets
    /// [`Error::ScopeDestroyed`], which enclosing runs treat as an
    /// interruption rather than a teardown. Any other failure leaves state
    /// untouched.
    pub fn run<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Scope) -> Result<T>,
    {
        self.run_with(name, RunOptions::default(), f)
    }

    /// [`run`](Self::run) with overrides for the child
    pub fn run_with<T, F>(&self, name: &str, options: RunOptions, f: F) -> Result<T>
    where
        F: FnOnce(&Scope) -> Result<T>,
    {
        let child = self.child(name, options)?;
        self.inner
            .entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());

        let result = {
            let _guard = child.enter();
            f(&child)
        };

        match result {
            Ok(value) => {
                child.finalize()?;
                Ok(value)
            }
            Err(Error::Destroyed { fqn }) => {
                log::info!("Destroying scope {}: {} destroyed itself", child.path(), fqn);
                child.destroy()?;
                Err(Error::ScopeDestroyed {
                    scope: child.path().to_string(),
                    fqn,
                })
            }
            Err(err) if err.is_signal() => {
                child.interrupt();
                Err(err)
            }
            Err(err) => {
                child.fail();
                Err(err)
            }
        }
    }

    /// Make this scope current on this thread until the guard drops
    pub fn enter(&self) -> ScopeGuard {
        CURRENT.with(|stack| stack.borrow_mut().push(self.clone()));
        ScopeGuard {
            _not_send: PhantomData,
        }
    }

    /// Innermost scope entered on this thread
    pub fn current() -> Option<Scope> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Create or update a resource and return its output
    pub fn apply<P: Provider>(&self, id: &str, props: &P::Props) -> Result<P::Output> {
        self.apply_with::<P>(id, props, ApplyOptions::default())
    }

    /// [`apply`](Self::apply) with per-call options
    pub fn apply_with<P: Provider>(
        &self,
        id: &str,
        props: &P::Props,
        options: ApplyOptions,
    ) -> Result<P::Output> {
        let value = serde_json::to_value(props).map_err(|source| Error::Serialization {
            fqn: self.fqn(id),
            source,
        })?;
        let output = self.apply_value(P::KIND, id, value, options)?;
        serde_json::from_value(output).map_err(|source| Error::Serialization {
            fqn: self.fqn(id),
            source,
        })
    }

    /// Apply a resource by kind name with untyped props
    pub fn apply_value(
        &self,
        kind: &str,
        id: &str,
        props: Value,
        options: ApplyOptions,
    ) -> Result<Value> {
        apply::apply(self, kind, id, props, options)
    }

    /// Finish this scope
    ///
    /// In the up phase this deletes resources retired by replacements and
    /// then prunes orphans: resources and child scopes persisted by an
    /// earlier run that this run never declared. In the destroy phase the
    /// root destroys everything. A failed or interrupted scope skips
    /// pruning. Runs once.
    pub fn finalize(&self) -> Result<()> {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.is_errored() {
            log::warn!("Scope {} failed; skipping orphan cleanup", self.path());
            return Ok(());
        }
        if self.is_interrupted() {
            log::debug!("Scope {} was interrupted; skipping orphan cleanup", self.path());
            return Ok(());
        }

        match self.phase() {
            Phase::Read => Ok(()),
            Phase::Destroy if self.is_root() => destroy::destroy_scope(self),
            Phase::Destroy => Ok(()),
            Phase::Up => {
                destroy::delete_retired(self)?;
                destroy::prune_orphans(self)
            }
        }
    }

    /// Destroy every resource and child scope under this scope
    pub fn destroy(&self) -> Result<()> {
        self.inner.finalized.store(true, Ordering::SeqCst);
        destroy::destroy_scope(self)
    }

    /// Mark the scope as failed so that finalizing skips pruning
    pub fn fail(&self) {
        self.inner.errored.store(true, Ordering::SeqCst);
    }

    pub fn is_errored(&self) -> bool {
        self.inner.errored.load(Ordering::SeqCst)
    }

    /// Mark the scope as cut short by a signal
    ///
    /// The scope did not fail, but resources it would have declared after the
    /// signal were never applied, so finalizing leaves persisted state alone.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Scope name; `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn app(&self) -> Option<&str> {
        self.inner.app.as_deref()
    }

    pub fn stage(&self) -> &str {
        &self.inner.stage
    }

    pub fn phase(&self) -> Phase {
        self.inner.shared.phase
    }

    pub fn is_quiet(&self) -> bool {
        self.inner.quiet
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Parent scope, while a handle to it is still alive
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    /// Chain of names from the root to this scope
    pub fn path(&self) -> &ScopePath {
        &self.inner.path
    }

    /// Fully qualified name of resource `id` in this scope
    pub fn fqn(&self, id: &str) -> String {
        self.inner.path.fqn(id)
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.shared.registry
    }

    pub fn store(&self) -> &dyn StateStore {
        self.inner.shared.store.as_ref()
    }

    /// Ids of resources applied through this scope during this run
    pub fn resources(&self) -> Vec<String> {
        self.inner
            .declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Stored record of resource `id`, secrets decrypted
    pub fn state(&self, id: &str) -> Result<Option<State>> {
        self.read_state(id)
    }

    /// Every stored record of this scope, secrets decrypted
    pub fn states(&self) -> Result<BTreeMap<String, State>> {
        self.store()
            .all(self.path())?
            .into_iter()
            .map(|(id, state)| Ok((id, self.unseal(state)?)))
            .collect()
    }

    /// Wrap `plaintext` as a secret and register it
    pub fn secret(&self, plaintext: impl Into<String>, name: Option<&str>) -> Secret {
        self.registry().secret(plaintext, name)
    }

    /// Encrypt a secret into its persisted wrapper
    pub fn serialize_secret(&self, secret: &Secret) -> Result<Value> {
        let cipher = self.cipher()?;
        secretkit::serialize(secret, cipher.as_ref()).map_err(|source| self.secret_error(source))
    }

    /// Decrypt a persisted wrapper back into a secret
    pub fn deserialize_secret(&self, value: &Value) -> Result<Secret> {
        let cipher = self.cipher()?;
        secretkit::deserialize(value, cipher.as_ref()).map_err(|source| self.secret_error(source))
    }

    pub(crate) fn destroy_orphans(&self) -> bool {
        self.inner.shared.destroy_orphans
    }

    pub(crate) fn destroy_jobs(&self) -> usize {
        self.inner.shared.destroy_jobs
    }

    /// Record that resource `id` of `kind` is declared this run
    pub(crate) fn declare(&self, id: &str, kind: &str) -> Result<()> {
        let mut declared = self
            .inner
            .declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match declared.get(id) {
            Some(existing) if existing != kind => Err(Error::KindMismatch {
                fqn: self.fqn(id),
                existing: existing.clone(),
                requested: kind.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                declared.insert(id.to_string(), kind.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn is_declared(&self, id: &str) -> bool {
        self.inner
            .declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub(crate) fn was_entered(&self, name: &str) -> bool {
        self.inner
            .entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Lock serializing operations on resource `id` across the whole tree
    pub(crate) fn lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .shared
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(self.fqn(id)).or_default())
    }

    /// Sequence number for a newly created record
    pub(crate) fn next_seq(&self) -> Result<u64> {
        let mut next = self
            .inner
            .next_seq
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let seq = match *next {
            Some(seq) => seq,
            None => self
                .store()
                .all(self.path())?
                .values()
                .map(|state| state.seq + 1)
                .max()
                .unwrap_or(0),
        };
        *next = Some(seq + 1);
        Ok(seq)
    }

    pub(crate) fn read_state(&self, id: &str) -> Result<Option<State>> {
        self.store()
            .get(self.path(), id)?
            .map(|state| self.unseal(state))
            .transpose()
    }

    /// Seal secrets and persist `state`
    pub(crate) fn write_state(&self, state: &State) -> Result<()> {
        let cipher = if state.contains_secret() {
            self.cipher()?
        } else {
            None
        };
        let sealed = state
            .try_map_values(|v| secretkit::seal(v, cipher.as_ref()))
            .map_err(|source| Error::Secret {
                fqn: state.fqn.clone(),
                phase: None,
                source,
            })?;
        log::debug!("{}: persisting status {}", state.fqn, state.status);
        self.store().set(self.path(), &state.id, &sealed)
    }

    pub(crate) fn delete_state(&self, id: &str) -> Result<()> {
        self.store().delete(self.path(), id)
    }

    pub(crate) fn unseal(&self, state: State) -> Result<State> {
        if !state.contains_secret() {
            return Ok(state);
        }
        let cipher = self.cipher()?;
        state
            .try_map_values(|v| secretkit::unseal(v, cipher.as_ref()))
            .map_err(|source| Error::Secret {
                fqn: state.fqn.clone(),
                phase: None,
                source,
            })
    }

    /// Cipher for this scope's password; `None` without a password
    fn cipher(&self) -> Result<Option<Cipher>> {
        let Some(password) = self.inner.keys.password.as_deref() else {
            return Ok(None);
        };

        let mut cached = self
            .inner
            .keys
            .cipher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cipher) = cached.as_ref() {
            return Ok(Some(cipher.clone()));
        }

        let salt = self.salt()?;
        let cipher = Cipher::derive(password, &salt).map_err(|source| self.secret_error(source))?;
        *cached = Some(cipher.clone());
        Ok(Some(cipher))
    }

    /// Deployment salt, created and persisted at the root on first use
    fn salt(&self) -> Result<Salt> {
        let shared = &self.inner.shared;
        let mut cached = shared.salt.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(salt) = cached.as_ref() {
            return Ok(salt.clone());
        }

        let salt = match shared.store.get_meta(&shared.root, SALT_KEY)? {
            Some(encoded) => Salt::decode(&encoded).map_err(|source| self.secret_error(source))?,
            None => {
                let salt = Salt::generate().map_err(|source| self.secret_error(source))?;
                shared.store.set_meta(&shared.root, SALT_KEY, &salt.encode())?;
                log::debug!("Generated encryption salt for {}", shared.root);
                salt
            }
        };
        *cached = Some(salt.clone());
        Ok(salt)
    }

    fn secret_error(&self, source: secretkit::Error) -> Error {
        Error::Secret {
            fqn: self.path().to_string(),
            phase: None,
            source,
        }
    }

    pub(crate) fn report_start(&self, fqn: &str, phase: Lifecycle) {
        if !self.inner.quiet {
            self.inner.shared.progress.on_resource_start(fqn, phase);
        }
    }

    pub(crate) fn report_complete(&self, fqn: &str, result: &ApplyResult) {
        if !self.inner.quiet {
            self.inner.shared.progress.on_resource_complete(fqn, result);
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.inner.path.to_string())
            .field("phase", &self.inner.shared.phase)
            .field("quiet", &self.inner.quiet)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    fn root(options: RootOptions) -> Scope {
        Scope::root(
            options,
            Arc::new(MemoryStateStore::new()),
            Arc::new(Registry::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_root_requires_stage() {
        let result = Scope::root(
            RootOptions::new(""),
            Arc::new(MemoryStateStore::new()),
            Arc::new(Registry::new()),
        );
        assert!(matches!(result, Err(Error::InvalidScope(_))));
    }

    #[test]
    fn test_child_requires_name() {
        let root = root(RootOptions::new("dev"));
        assert!(matches!(
            root.child("", RunOptions::default()),
            Err(Error::InvalidScope(_))
        ));
        assert!(matches!(
            root.run("", |_| Ok(())),
            Err(Error::InvalidScope(_))
        ));
    }

    #[test]
    fn test_chain_and_fqn() {
        let root = root(RootOptions::new("prod").app("shop"));
        assert!(root.is_root());
        assert_eq!(root.name(), None);
        assert_eq!(root.fqn("db"), "shop/prod/db");

        root.run("api", |api| {
            assert_eq!(api.name(), Some("api"));
            assert_eq!(api.stage(), "prod");
            assert_eq!(api.app(), Some("shop"));
            assert_eq!(api.path().to_string(), "shop/prod/api");
            assert_eq!(api.fqn("bucket"), "shop/prod/api/bucket");
            assert_eq!(api.parent().unwrap().path(), root.path());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_overrides_are_inherited() {
        let root = root(RootOptions::new("dev").quiet(true).password("pw"));
        let child = root.child("a", RunOptions::default()).unwrap();
        assert!(child.is_quiet());
        let loud = root.child("b", RunOptions::default().quiet(false)).unwrap();
        assert!(!loud.is_quiet());
        assert!(loud.child("c", RunOptions::default()).map(|c| !c.is_quiet()).unwrap());
    }

    #[test]
    fn test_current_scope_follows_run() {
        let root = root(RootOptions::new("dev"));
        assert!(Scope::current().is_none());

        root.run("outer", |_| {
            let current = Scope::current().unwrap();
            assert_eq!(current.name(), Some("outer"));
            current.run("inner", |_| {
                assert_eq!(Scope::current().unwrap().name(), Some("inner"));
                Ok(())
            })?;
            assert_eq!(Scope::current().unwrap().name(), Some("outer"));
            Ok(())
        })
        .unwrap();

        assert!(Scope::current().is_none());
    }

    #[test]
    fn test_current_scope_restored_on_error() {
        let root = root(RootOptions::new("dev"));
        let result: Result<()> = root.run("failing", |_| Err(Error::SamePassword));
        assert!(result.is_err());
        assert!(Scope::current().is_none());
    }

    #[test]
    fn test_declare_rejects_kind_change() {
        let root = root(RootOptions::new("dev"));
        root.declare("x", "a::One").unwrap();
        root.declare("x", "a::One").unwrap();
        assert!(matches!(
            root.declare("x", "a::Two"),
            Err(Error::KindMismatch { .. })
        ));
        assert_eq!(root.resources(), vec!["x".to_string()]);
    }

    #[test]
    fn test_salt_is_created_once() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(Registry::new());
        let root = Scope::root(
            RootOptions::new("dev").password("pw"),
            store.clone(),
            registry.clone(),
        )
        .unwrap();

        let blob = root.serialize_secret(&Secret::new("x")).unwrap();
        let salt = store.get_meta(root.path(), SALT_KEY).unwrap().unwrap();

        // A second deployment run over the same store reuses the salt
        let again =
            Scope::root(RootOptions::new("dev").password("pw"), store.clone(), registry).unwrap();
        assert_eq!(again.deserialize_secret(&blob).unwrap().expose(), "x");
        assert_eq!(store.get_meta(root.path(), SALT_KEY).unwrap().unwrap(), salt);
    }

    #[test]
    fn test_serialize_secret_requires_password() {
        let root = root(RootOptions::new("dev"));
        let err = root.serialize_secret(&Secret::new("x")).unwrap_err();
        assert!(matches!(
            err,
            Error::Secret {
                source: secretkit::Error::MissingPassword { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_seq_continues_from_store() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(Registry::new());
        let root = Scope::root(RootOptions::new("dev"), store.clone(), registry.clone()).unwrap();
        let path = root.path().clone();

        let mut state = State::new("k", "a", root.fqn("a"), 7, Value::Null);
        state.status = crate::types::Status::Created;
        store.set(&path, "a", &state).unwrap();

        let fresh = Scope::root(RootOptions::new("dev"), store, registry).unwrap();
        assert_eq!(fresh.next_seq().unwrap(), 8);
        assert_eq!(fresh.next_seq().unwrap(), 9);
    }
}
