//! Error types for the diffkit crate

use thiserror::Error;

/// Syntax errors in a path expression
///
/// Positions are character offsets into the expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// An identifier was expected but nothing was found (`a..b`, `a.`, ``)
    #[error("empty identifier at position {position} in `{path}`")]
    EmptyIdentifier { path: String, position: usize },

    /// A `[` was never closed
    #[error("unterminated bracket at position {position} in `{path}`")]
    UnterminatedBracket { path: String, position: usize },

    /// A quoted key was never closed
    #[error("unterminated string at position {position} in `{path}`")]
    UnterminatedString { path: String, position: usize },

    /// Bracket contents are neither digits nor a quoted string
    #[error("invalid bracket contents at position {position} in `{path}`")]
    InvalidIndex { path: String, position: usize },

    /// A character that cannot start or continue a segment
    #[error("unexpected character `{found}` at position {position} in `{path}`")]
    UnexpectedCharacter {
        path: String,
        position: usize,
        found: char,
    },
}

/// Result type for path operations
pub type Result<T> = std::result::Result<T, PathError>;
