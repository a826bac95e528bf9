//! # Declarative
//!
//! An engine for reconciling declared resources against persisted state.
//!
//! A deployment is a tree of [`Scope`]s rooted at an app and stage. Code
//! running inside a scope declares resources by kind, id and props; the
//! engine compares each declaration with the record from the previous run
//! and invokes the kind's [`Provider`] only when something changed. When a
//! scope finishes, resources it owned before and no longer declares are
//! destroyed.
//!
//! ## Core Concepts
//!
//! - **Scope**: a named node with a state store, a phase and a password
//! - **Provider**: create/update/delete handler for one resource kind
//! - **State**: the persisted record of one resource (status, props, output,
//!   auxiliary data)
//! - **Secret**: a string that is encrypted before it reaches the store
//!
//! ## Example
//!
//! ```
//! use declarative::{Context, HandlerResult, MemoryStateStore, Provider, Registry, RootOptions, Scope};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Provider for Echo {
//!     const KIND: &'static str = "demo::Echo";
//!     type Props = String;
//!     type Output = String;
//!
//!     fn handle(&self, _ctx: &mut Context<'_, String>, _id: &str, props: &String) -> HandlerResult<String> {
//!         Ok(props.to_uppercase())
//!     }
//! }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register(Echo)?;
//!
//! let root = Scope::root(RootOptions::new("dev"), Arc::new(MemoryStateStore::new()), registry)?;
//! let output = root.run("web", |scope| scope.apply::<Echo>("greeting", &"hello".to_string()))?;
//! assert_eq!(output, "HELLO");
//! root.finalize()?;
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: lifecycle handler for a resource kind
//! - [`StateStore`]: where records live ([`FileSystemStateStore`],
//!   [`MemoryStateStore`])
//! - [`ProgressCallback`]: receives progress updates

mod apply;
pub mod context;
mod destroy;
pub mod error;
pub mod provider;
pub mod rotate;
pub mod scope;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use context::{Context, NoProgress, ProgressCallback};
pub use error::{Error, ErrorCategory, HandlerError, HandlerResult, Result};
pub use provider::{Provider, Registry};
pub use rotate::rotate_password;
pub use scope::{RootOptions, RunOptions, Scope, ScopeGuard};
pub use secretkit::Secret;
pub use store::{FileSystemStateStore, MemoryStateStore, ScopePath, StateStore};
pub use types::{
    ApplyOptions, ApplyResult, DestroyStrategy, Lifecycle, Phase, ProviderOptions,
    ReplaceStrategy, Retired, RotationSummary, RunSummary, State, Status,
};
