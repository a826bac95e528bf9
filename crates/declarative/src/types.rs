//! Core types: persisted state records, lifecycle phases and options

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle status of a persisted resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl Status {
    /// Whether the last handler invocation completed
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    /// Whether a handler invocation was started and never committed
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Which transition a handler invocation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// What a deployment run does with the resources it declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Create or update declared resources, prune orphans
    #[default]
    Up,
    /// Return stored outputs without invoking providers
    Read,
    /// Tear everything down when the root scope finalizes
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Read => "read",
            Self::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

/// A replaced resource still waiting for its delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retired {
    pub props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// Persisted record for one resource
///
/// `output` is only present while the status is `created` or `updated`.
/// While an update or delete is in flight the last committed output is
/// parked in `old_output`, next to the previous props in `old_props`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(rename = "provider")]
    pub kind: String,
    pub id: String,
    pub fqn: String,
    pub seq: u64,
    pub status: Status,
    pub props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_props: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<Retired>,
}

impl State {
    /// A fresh record about to be created
    pub fn new(kind: &str, id: &str, fqn: String, seq: u64, props: Value) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
            fqn,
            seq,
            status: Status::Creating,
            props,
            old_props: None,
            output: None,
            old_output: None,
            data: Map::new(),
            retired: Vec::new(),
        }
    }

    /// Output of the last committed create or update, even mid-transition
    pub fn last_output(&self) -> Option<&Value> {
        self.output.as_ref().or(self.old_output.as_ref())
    }

    /// Move the committed output aside before a transition starts
    pub(crate) fn park_output(&mut self) {
        if let Some(output) = self.output.take() {
            self.old_output = Some(output);
        }
    }

    /// Rebuild the record with every JSON value passed through `f`
    ///
    /// Used to seal and unseal secrets at the persistence boundary.
    pub fn try_map_values<E, F>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&Value) -> Result<Value, E>,
    {
        let mut data = Map::with_capacity(self.data.len());
        for (key, value) in &self.data {
            data.insert(key.clone(), f(value)?);
        }

        let mut retired = Vec::with_capacity(self.retired.len());
        for entry in &self.retired {
            let mut entry_data = Map::with_capacity(entry.data.len());
            for (key, value) in &entry.data {
                entry_data.insert(key.clone(), f(value)?);
            }
            retired.push(Retired {
                props: f(&entry.props)?,
                output: entry.output.as_ref().map(&mut f).transpose()?,
                data: entry_data,
            });
        }

        Ok(Self {
            kind: self.kind.clone(),
            id: self.id.clone(),
            fqn: self.fqn.clone(),
            seq: self.seq,
            status: self.status,
            props: f(&self.props)?,
            old_props: self.old_props.as_ref().map(&mut f).transpose()?,
            output: self.output.as_ref().map(&mut f).transpose()?,
            old_output: self.old_output.as_ref().map(&mut f).transpose()?,
            data,
            retired,
        })
    }

    /// Every JSON value held by the record
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let retired = self.retired.iter().flat_map(|r| {
            std::iter::once(&r.props)
                .chain(r.output.as_ref())
                .chain(r.data.values())
        });
        std::iter::once(&self.props)
            .chain(self.old_props.as_ref())
            .chain(self.output.as_ref())
            .chain(self.old_output.as_ref())
            .chain(self.data.values())
            .chain(retired)
    }

    /// Whether any secret leaf appears anywhere in the record
    pub fn contains_secret(&self) -> bool {
        self.values().any(secretkit::contains_secret)
    }
}

/// How a provider's resources are torn down relative to their siblings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DestroyStrategy {
    /// One at a time, in reverse creation order
    #[default]
    Sequential,
    /// Adjacent resources with this strategy are deleted concurrently
    Parallel,
}

/// Ordering of the create and delete halves of a replacement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Create the new resource now, delete the old one when the scope finalizes
    #[default]
    CreateBeforeDelete,
    /// Delete the old resource, then create the new one
    DeleteBeforeCreate,
}

/// Per-provider behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Invoke the handler even when props are unchanged
    pub always_update: bool,
    pub destroy_strategy: DestroyStrategy,
    pub replace_strategy: ReplaceStrategy,
}

impl ProviderOptions {
    pub fn always_update(mut self) -> Self {
        self.always_update = true;
        self
    }

    pub fn destroy_strategy(mut self, strategy: DestroyStrategy) -> Self {
        self.destroy_strategy = strategy;
        self
    }

    pub fn replace_strategy(mut self, strategy: ReplaceStrategy) -> Self {
        self.replace_strategy = strategy;
        self
    }
}

/// Per-call apply switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Invoke the handler even when props are unchanged
    pub force: bool,
}

/// Outcome of a single resource operation, as reported to progress callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Props unchanged, handler not invoked
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place
    Updated,
    /// Resource was replaced with a new one
    Replaced,
    /// Resource was deleted
    Deleted,
    /// The operation failed
    Failed { error: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Replaced | Self::Deleted
        )
    }
}

/// Tally of operation outcomes over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.unchanged += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Deleted => self.deleted += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
        }
    }
}

/// Outcome of re-encrypting stored secrets under a new password
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Records examined
    pub records_scanned: usize,
    /// Records that held secrets and were rewritten
    pub records_rewritten: usize,
    /// Individual secret values re-encrypted
    pub secrets_rotated: usize,
}
