//! Error types for the reconciliation engine

use crate::types::Lifecycle;
use thiserror::Error;

/// Broad classification used for reporting and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad setup: missing password, unknown provider, invalid scope
    Configuration,
    /// A provider handler failed
    Handler,
    /// Control-flow signal raised by a handler, not a failure
    Signal,
    /// The state store could not be read or written
    Store,
}

impl ErrorCategory {
    /// Whether re-running the same operation could succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Handler | Self::Store)
    }

    /// Short label for console output
    pub fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Handler => "handler",
            Self::Signal => "signal",
            Self::Store => "state store",
        }
    }
}

/// Errors surfaced by scopes, apply, destroy and rotation
#[derive(Debug, Error)]
pub enum Error {
    /// Secret encryption, decryption or key derivation failed
    #[error("{fqn}: {}{source}", phase_prefix(.phase))]
    Secret {
        fqn: String,
        /// Lifecycle transition in progress, when raised by apply or destroy
        phase: Option<Lifecycle>,
        #[source]
        source: secretkit::Error,
    },

    /// Password rotation was asked to rotate to the same password
    #[error("new password must differ from the old password")]
    SamePassword,

    /// A scope was created with invalid arguments
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// No provider is registered for a resource kind
    #[error("no provider registered for kind '{kind}'")]
    ProviderNotRegistered { kind: String },

    /// A provider kind was registered twice
    #[error("provider '{kind}' is already registered")]
    DuplicateProvider { kind: String },

    /// One id was declared with two different kinds
    #[error("{fqn}: already declared as '{existing}', cannot apply as '{requested}'")]
    KindMismatch {
        fqn: String,
        existing: String,
        requested: String,
    },

    /// Read phase asked for a resource that has no settled state
    #[error("{fqn}: no state found")]
    NotFound { fqn: String },

    /// A provider handler failed
    #[error("{fqn}: {phase} failed: {source}")]
    Handler {
        fqn: String,
        phase: Lifecycle,
        #[source]
        source: anyhow::Error,
    },

    /// A handler asked for its own destruction
    #[error("{fqn}: destroyed")]
    Destroyed { fqn: String },

    /// The run block holding a destroyed resource was torn down
    ///
    /// Replaces [`Error::Destroyed`] once the innermost run block has
    /// handled it, so enclosing blocks only stop.
    #[error("{scope}: destroyed by {fqn}")]
    ScopeDestroyed { scope: String, fqn: String },

    /// Props or outputs could not be converted to or from JSON
    #[error("{fqn}: {source}")]
    Serialization {
        fqn: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem error in the state store
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A state record on disk could not be parsed
    #[error("corrupt state at {location}: {source}")]
    CorruptState {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Secret { .. }
            | Self::SamePassword
            | Self::InvalidScope(_)
            | Self::ProviderNotRegistered { .. }
            | Self::DuplicateProvider { .. }
            | Self::KindMismatch { .. }
            | Self::NotFound { .. }
            | Self::Serialization { .. } => ErrorCategory::Configuration,
            Self::Handler { .. } => ErrorCategory::Handler,
            Self::Destroyed { .. } | Self::ScopeDestroyed { .. } => ErrorCategory::Signal,
            Self::Io { .. } | Self::CorruptState { .. } => ErrorCategory::Store,
        }
    }

    /// Whether this is the destroy signal rather than a failure
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed { .. })
    }

    /// Whether this is an intentional stop rather than a failure
    pub fn is_signal(&self) -> bool {
        self.category() == ErrorCategory::Signal
    }

    /// Fully qualified name of the resource involved, if any
    pub fn fqn(&self) -> Option<&str> {
        match self {
            Self::Secret { fqn, .. }
            | Self::KindMismatch { fqn, .. }
            | Self::NotFound { fqn }
            | Self::Handler { fqn, .. }
            | Self::Destroyed { fqn }
            | Self::ScopeDestroyed { fqn, .. }
            | Self::Serialization { fqn, .. } => Some(fqn),
            _ => None,
        }
    }

    /// Tag a secret error with the transition it interrupted
    pub(crate) fn in_phase(self, phase: Lifecycle) -> Self {
        match self {
            Self::Secret {
                fqn,
                phase: None,
                source,
            } => Self::Secret {
                fqn,
                phase: Some(phase),
                source,
            },
            other => other,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

fn phase_prefix(phase: &Option<Lifecycle>) -> String {
    phase.map_or_else(String::new, |phase| format!("{} failed: ", phase))
}

/// What a provider handler returns instead of an output
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Raised by [`Context::destroy`](crate::Context::destroy)
    #[error("resource destroyed")]
    Destroyed,

    /// Any other failure
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Result type for provider handlers
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Error::SamePassword.category(), ErrorCategory::Configuration);
        assert_eq!(
            Error::Destroyed { fqn: "a/b".into() }.category(),
            ErrorCategory::Signal
        );
        assert!(!ErrorCategory::Configuration.is_retryable());
        assert!(!ErrorCategory::Signal.is_retryable());
        assert!(ErrorCategory::Handler.is_retryable());
    }

    #[test]
    fn test_handler_error_carries_fqn_and_phase() {
        let err = Error::Handler {
            fqn: "app/dev/bucket".into(),
            phase: Lifecycle::Update,
            source: anyhow::anyhow!("quota exceeded"),
        };
        assert_eq!(err.to_string(), "app/dev/bucket: update failed: quota exceeded");
        assert_eq!(err.fqn(), Some("app/dev/bucket"));
    }

    #[test]
    fn test_secret_error_names_the_phase() {
        let err = Error::Secret {
            fqn: "app/dev/db".into(),
            phase: None,
            source: secretkit::Error::Decrypt,
        };
        let plain = err.to_string();
        assert!(plain.starts_with("app/dev/db: "));
        assert!(!plain.contains("failed"));

        let tagged = err.in_phase(Lifecycle::Update);
        assert!(tagged.to_string().starts_with("app/dev/db: update failed: "));
        // An existing phase is kept
        let retagged = tagged.in_phase(Lifecycle::Delete);
        assert!(matches!(
            retagged,
            Error::Secret {
                phase: Some(Lifecycle::Update),
                ..
            }
        ));
        assert!(Error::SamePassword.in_phase(Lifecycle::Create).to_string().contains("differ"));
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        fn failing() -> HandlerResult<()> {
            let parsed: anyhow::Result<u32> = Err(anyhow::anyhow!("boom"));
            parsed?;
            Ok(())
        }
        assert!(matches!(failing(), Err(HandlerError::Failed(_))));
    }
}
