//! Provider trait and the registry of providers and secrets
//!
//! A [`Provider`] implements create, update and delete for one resource
//! kind. Its props and output are ordinary typed values; the engine only
//! sees them as `serde_json::Value` once they cross into persistence.

use crate::context::{Context, Invocation};
use crate::error::{Error, HandlerResult, Result};
use crate::types::ProviderOptions;
use anyhow::Context as _;
use secretkit::{Secret, SecretRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Lifecycle handler for one resource kind
///
/// # Example
///
/// ```
/// use declarative::{Context, HandlerResult, Lifecycle, Provider};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Props { name: String }
///
/// #[derive(Serialize, Deserialize)]
/// struct Output { greeting: String }
///
/// struct Greeter;
///
/// impl Provider for Greeter {
///     const KIND: &'static str = "demo::Greeter";
///     type Props = Props;
///     type Output = Output;
///
///     fn handle(&self, ctx: &mut Context<'_, Output>, _id: &str, props: &Props) -> HandlerResult<Output> {
///         if ctx.phase() == Lifecycle::Delete {
///             return ctx.destroy();
///         }
///         Ok(Output { greeting: format!("hello {}", props.name) })
///     }
/// }
/// ```
pub trait Provider: Send + Sync + 'static {
    /// Unique kind name, e.g. `fs::File`
    const KIND: &'static str;

    /// Desired configuration supplied by the user
    type Props: Serialize + DeserializeOwned;

    /// What the handler reports back after create or update
    type Output: Serialize + DeserializeOwned;

    fn options(&self) -> ProviderOptions {
        ProviderOptions::default()
    }

    /// Run one lifecycle transition
    ///
    /// `ctx.phase()` says which. In the delete phase `props` are the stored
    /// props and the return value is ignored; returning
    /// [`Context::destroy`] is the conventional way to finish.
    fn handle(
        &self,
        ctx: &mut Context<'_, Self::Output>,
        id: &str,
        props: &Self::Props,
    ) -> HandlerResult<Self::Output>;
}

/// Type-erased view of a provider used by the engine
pub(crate) trait DynProvider: Send + Sync {
    fn kind(&self) -> &'static str;
    fn options(&self) -> ProviderOptions;
    fn invoke(&self, invocation: &mut Invocation, props: &Value) -> HandlerResult<Value>;
}

impl<P: Provider> DynProvider for P {
    fn kind(&self) -> &'static str {
        P::KIND
    }

    fn options(&self) -> ProviderOptions {
        Provider::options(self)
    }

    fn invoke(&self, invocation: &mut Invocation, props: &Value) -> HandlerResult<Value> {
        let props: P::Props = serde_json::from_value(props.clone())
            .with_context(|| format!("invalid props for {}", P::KIND))?;
        let output: Option<P::Output> = invocation
            .prior_output()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .with_context(|| format!("stored output does not match {}", P::KIND))?;

        let id = invocation.id().to_string();
        let mut ctx = Context::new(invocation, output);
        let output = self.handle(&mut ctx, &id, &props)?;
        Ok(serde_json::to_value(output)
            .with_context(|| format!("invalid output from {}", P::KIND))?)
    }
}

/// Providers by kind, plus every secret wrapped during the run
///
/// Shared by all scopes of a deployment. Providers are registered up front
/// and never replaced.
#[derive(Default)]
pub struct Registry {
    providers: RwLock<BTreeMap<&'static str, Arc<dyn DynProvider>>>,
    secrets: SecretRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under [`Provider::KIND`]
    pub fn register<P: Provider>(&self, provider: P) -> Result<()> {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(P::KIND) {
            return Err(Error::DuplicateProvider {
                kind: P::KIND.to_string(),
            });
        }
        log::debug!("Registered provider {}", P::KIND);
        providers.insert(P::KIND, Arc::new(provider));
        Ok(())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Whether a provider is registered for `kind`
    pub fn contains(&self, kind: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    pub(crate) fn provider(&self, kind: &str) -> Result<Arc<dyn DynProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::ProviderNotRegistered {
                kind: kind.to_string(),
            })
    }

    /// Wrap `plaintext` as a secret and remember it
    pub fn secret(&self, plaintext: impl Into<String>, name: Option<&str>) -> Secret {
        self.secrets.wrap(plaintext, name)
    }

    /// Names of registered secrets
    pub fn secret_names(&self) -> Vec<String> {
        self.secrets.names()
    }

    pub fn secrets(&self) -> &SecretRegistry {
        &self.secrets
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.kinds())
            .field("secrets", &self.secrets.len())
            .finish()
    }
}
