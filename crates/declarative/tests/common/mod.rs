//! Providers and stores shared by the integration tests

#![allow(dead_code)]

use anyhow::Context as _;
use declarative::{
    ApplyResult, Context, DestroyStrategy, HandlerResult, Lifecycle, MemoryStateStore,
    ProgressCallback, Provider, ProviderOptions, Registry, ReplaceStrategy, RootOptions, Scope,
    ScopePath, Secret, State, StateStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Log of handler invocations shared by every test provider
#[derive(Clone, Default)]
pub struct Calls {
    log: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Calls {
    pub fn record(&self, phase: Lifecycle, id: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", phase, id));
    }

    pub fn all(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Highest number of handlers seen running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Progress callback that keeps every completed outcome
#[derive(Default)]
pub struct Recorder {
    results: Mutex<Vec<(String, ApplyResult)>>,
}

impl Recorder {
    pub fn results(&self) -> Vec<(String, ApplyResult)> {
        self.results.lock().unwrap().clone()
    }

    /// Outcome reported last for `fqn`
    pub fn last(&self, fqn: &str) -> Option<ApplyResult> {
        self.results()
            .into_iter()
            .rev()
            .find(|(name, _)| name == fqn)
            .map(|(_, result)| result)
    }
}

impl ProgressCallback for Recorder {
    fn on_resource_start(&self, _fqn: &str, _phase: Lifecycle) {}

    fn on_resource_complete(&self, fqn: &str, result: &ApplyResult) {
        self.results
            .lock()
            .unwrap()
            .push((fqn.to_string(), result.clone()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProps {
    pub name: String,
    #[serde(default)]
    pub size: u32,
    /// Fail the create or update handler
    #[serde(default)]
    pub fail: bool,
    /// Call `destroy()` from the create handler
    #[serde(default)]
    pub self_destruct: bool,
    /// Sleep this long in the delete handler
    #[serde(default)]
    pub delete_delay_ms: u64,
}

impl ItemProps {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn self_destructing(mut self) -> Self {
        self.self_destruct = true;
        self
    }

    pub fn slow_delete(mut self, ms: u64) -> Self {
        self.delete_delay_ms = ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutput {
    pub name: String,
    pub size: u32,
    pub generation: u32,
    pub created_as: String,
}

/// Shared handler: renaming forces a replacement, everything else updates
fn handle_item(
    calls: &Calls,
    ctx: &mut Context<'_, ItemOutput>,
    id: &str,
    props: &ItemProps,
) -> HandlerResult<ItemOutput> {
    calls.record(ctx.phase(), id);

    match ctx.phase() {
        Lifecycle::Delete => {
            if props.delete_delay_ms > 0 {
                calls.enter();
                thread::sleep(Duration::from_millis(props.delete_delay_ms));
                calls.exit();
            }
            return ctx.destroy();
        }
        Lifecycle::Create => {
            if props.self_destruct {
                return ctx.destroy();
            }
            ctx.set("created_as", &props.name)?;
        }
        Lifecycle::Update => {
            if ctx.changed("name")? {
                ctx.replace();
            }
        }
    }

    if props.fail {
        return Err(anyhow::anyhow!("simulated failure").into());
    }

    let generation = ctx.output().map_or(0, |o| o.generation + 1);
    let created_as = ctx
        .get::<String>("created_as")?
        .context("created_as missing from data bag")?;
    Ok(ItemOutput {
        name: props.name.clone(),
        size: props.size,
        generation,
        created_as,
    })
}

macro_rules! item_provider {
    ($name:ident, $kind:literal, $options:expr) => {
        pub struct $name(pub Calls);

        impl Provider for $name {
            const KIND: &'static str = $kind;
            type Props = ItemProps;
            type Output = ItemOutput;

            fn options(&self) -> ProviderOptions {
                $options
            }

            fn handle(
                &self,
                ctx: &mut Context<'_, ItemOutput>,
                id: &str,
                props: &ItemProps,
            ) -> HandlerResult<ItemOutput> {
                handle_item(&self.0, ctx, id, props)
            }
        }
    };
}

item_provider!(Item, "test::Item", ProviderOptions::default());
item_provider!(
    SwapItem,
    "test::SwapItem",
    ProviderOptions::default().replace_strategy(ReplaceStrategy::DeleteBeforeCreate)
);
item_provider!(
    ParallelItem,
    "test::ParallelItem",
    ProviderOptions::default().destroy_strategy(DestroyStrategy::Parallel)
);
item_provider!(
    AlwaysItem,
    "test::AlwaysItem",
    ProviderOptions::default().always_update()
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultProps {
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultOutput {
    pub password: Secret,
}

/// Generates a password and returns it as a secret output
pub struct Vault(pub Calls);

impl Provider for Vault {
    const KIND: &'static str = "test::Vault";
    type Props = VaultProps;
    type Output = VaultOutput;

    fn handle(
        &self,
        ctx: &mut Context<'_, VaultOutput>,
        id: &str,
        props: &VaultProps,
    ) -> HandlerResult<VaultOutput> {
        self.0.record(ctx.phase(), id);
        if ctx.phase() == Lifecycle::Delete {
            return ctx.destroy();
        }
        let generated = Secret::generate(props.length).context("failed to generate password")?;
        let password = ctx.registry().secret(generated.expose(), Some(id));
        Ok(VaultOutput { password })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentProps {
    pub children: Vec<String>,
}

/// Declares one nested `Item` per child name
pub struct Parent(pub Calls);

impl Provider for Parent {
    const KIND: &'static str = "test::Parent";
    type Props = ParentProps;
    type Output = Vec<ItemOutput>;

    fn handle(
        &self,
        ctx: &mut Context<'_, Vec<ItemOutput>>,
        id: &str,
        props: &ParentProps,
    ) -> HandlerResult<Vec<ItemOutput>> {
        self.0.record(ctx.phase(), id);
        if ctx.phase() == Lifecycle::Delete {
            return ctx.destroy();
        }

        let mut outputs = Vec::new();
        for child in &props.children {
            let output = ctx
                .scope()
                .apply::<Item>(child, &ItemProps::new(child))
                .with_context(|| format!("failed to apply child {}", child))?;
            outputs.push(output);
        }
        Ok(outputs)
    }
}

/// A registry with every test provider, plus the call log they share
pub struct Harness {
    pub store: Arc<CountingStore>,
    pub registry: Arc<Registry>,
    pub calls: Calls,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStateStore::new()))
    }

    pub fn with_store(inner: Arc<dyn StateStore>) -> Self {
        let calls = Calls::default();
        let registry = Arc::new(Registry::new());
        registry.register(Item(calls.clone())).unwrap();
        registry.register(SwapItem(calls.clone())).unwrap();
        registry.register(ParallelItem(calls.clone())).unwrap();
        registry.register(AlwaysItem(calls.clone())).unwrap();
        registry.register(Vault(calls.clone())).unwrap();
        registry.register(Parent(calls.clone())).unwrap();
        Self {
            store: Arc::new(CountingStore::new(inner)),
            registry,
            calls,
        }
    }

    /// A fresh root scope over the shared store, as a new run would create
    pub fn root(&self, options: RootOptions) -> Scope {
        Scope::root(options, self.store.clone(), self.registry.clone()).unwrap()
    }

    pub fn dev(&self) -> Scope {
        self.root(RootOptions::new("dev").app("test"))
    }

    /// Root scope reporting to `recorder`
    pub fn recorded(&self, recorder: &Arc<Recorder>) -> Scope {
        self.root(
            RootOptions::new("dev")
                .app("test")
                .progress(recorder.clone()),
        )
    }

    pub fn dev_path(&self) -> ScopePath {
        ScopePath::root(Some("test"), "dev")
    }
}

/// Store wrapper that counts record writes
#[derive(Debug)]
pub struct CountingStore {
    inner: Arc<dyn StateStore>,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StateStore for CountingStore {
    fn get(&self, scope: &ScopePath, id: &str) -> declarative::Result<Option<State>> {
        self.inner.get(scope, id)
    }

    fn set(&self, scope: &ScopePath, id: &str, state: &State) -> declarative::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(scope, id, state)
    }

    fn delete(&self, scope: &ScopePath, id: &str) -> declarative::Result<()> {
        self.inner.delete(scope, id)
    }

    fn all(&self, scope: &ScopePath) -> declarative::Result<BTreeMap<String, State>> {
        self.inner.all(scope)
    }

    fn children(&self, scope: &ScopePath) -> declarative::Result<Vec<String>> {
        self.inner.children(scope)
    }

    fn remove_scope(&self, scope: &ScopePath) -> declarative::Result<()> {
        self.inner.remove_scope(scope)
    }

    fn get_meta(&self, scope: &ScopePath, key: &str) -> declarative::Result<Option<String>> {
        self.inner.get_meta(scope, key)
    }

    fn set_meta(&self, scope: &ScopePath, key: &str, value: &str) -> declarative::Result<()> {
        self.inner.set_meta(scope, key, value)
    }
}
