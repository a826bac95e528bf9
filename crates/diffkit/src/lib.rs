//! # diffkit
//!
//! Structural comparison of JSON snapshots.
//!
//! Two primitives are provided:
//!
//! - [`diff`] walks two values and reports which key-paths were added,
//!   deleted or updated.
//! - [`exists`] evaluates a path expression (`a.b[0]["c-d"]`) against a
//!   value and reports what it resolves to.
//!
//! Providers combine them to decide whether a change can be applied in place
//! or needs a replacement:
//!
//! ```
//! use serde_json::json;
//!
//! let before = json!({ "name": "db", "region": "eu" });
//! let after = json!({ "name": "db", "region": "us" });
//!
//! let changes = diffkit::diff(&before, &after);
//! assert!(changes.affects("region").unwrap());
//! assert!(!changes.affects("name").unwrap());
//! ```

mod diff;
mod error;
mod path;

pub use diff::{Diff, changed, diff};
pub use error::{PathError, Result};
pub use path::{Path, Segment, exists};
