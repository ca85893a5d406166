//! Outcome model for conditional document tree mutations
//!
//! A tree write never fails with an error for structural reasons. Instead it
//! resolves to a [`TreeUpdateOutcome`] whose status tells the caller what to
//! do next:
//!
//! | status                | meaning                                  | caller action |
//! |-----------------------|------------------------------------------|---------------|
//! | `Ok`                  | write applied                            | done          |
//! | `Noop`                | condition did not hold, nothing changed  | done / re-read|
//! | `WriteLock`           | path locked by a prepared transaction    | retry         |
//! | `InvalidPath`         | parent (or node) does not exist          | abort         |
//! | `IllegalModification` | write not allowed on this node           | abort         |
//!
//! ## Invariants
//!
//! - `Ok` always carries a new value.
//! - `WriteLock`, `InvalidPath` and `IllegalModification` carry no values.
//! - `created()` holds iff the write applied and the node did not exist before.
//!
//! Decoding enforces the first two, so an outcome received over a session
//! is as well-formed as one built by the constructors.

use super::document_path::DocumentPath;
use crate::contract::Versioned;
use serde::{Deserialize, Serialize};

/// Closed set of tree mutation outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeUpdateStatus {
    /// The mutation was applied
    Ok,
    /// The mutation's condition did not hold; nothing changed
    Noop,
    /// The path is locked by a prepared transaction
    WriteLock,
    /// The target or its parent does not exist
    InvalidPath,
    /// The mutation is not permitted on this node
    IllegalModification,
}

impl TreeUpdateStatus {
    /// Whether the caller should retry the whole conditional operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, TreeUpdateStatus::WriteLock)
    }

    /// Whether this status is a failure that never carries values
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            TreeUpdateStatus::WriteLock
                | TreeUpdateStatus::InvalidPath
                | TreeUpdateStatus::IllegalModification
        )
    }
}

/// Classified result of a conditional tree write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTreeUpdateOutcome<V>")]
pub struct TreeUpdateOutcome<V> {
    status: TreeUpdateStatus,
    path: DocumentPath,
    old_value: Option<Versioned<V>>,
    new_value: Option<Versioned<V>>,
}

/// Wire shape of [`TreeUpdateOutcome`], checked before it is accepted
#[derive(Deserialize)]
struct RawTreeUpdateOutcome<V> {
    status: TreeUpdateStatus,
    path: DocumentPath,
    old_value: Option<Versioned<V>>,
    new_value: Option<Versioned<V>>,
}

impl<V> TryFrom<RawTreeUpdateOutcome<V>> for TreeUpdateOutcome<V> {
    type Error = String;

    fn try_from(raw: RawTreeUpdateOutcome<V>) -> Result<Self, Self::Error> {
        let carries_values = raw.old_value.is_some() || raw.new_value.is_some();
        if raw.status == TreeUpdateStatus::Ok && raw.new_value.is_none() {
            return Err(format!("Ok outcome for {} has no new value", raw.path));
        }
        if raw.status.is_terminal_failure() && carries_values {
            return Err(format!("{:?} outcome for {} carries values", raw.status, raw.path));
        }
        Ok(TreeUpdateOutcome {
            status: raw.status,
            path: raw.path,
            old_value: raw.old_value,
            new_value: raw.new_value,
        })
    }
}

impl<V> TreeUpdateOutcome<V> {
    /// A successful write from `old_value` (absent if created) to `new_value`
    pub fn ok(
        path: DocumentPath,
        old_value: Option<Versioned<V>>,
        new_value: Versioned<V>,
    ) -> Self {
        TreeUpdateOutcome {
            status: TreeUpdateStatus::Ok,
            path,
            old_value,
            new_value: Some(new_value),
        }
    }

    /// A write whose condition did not hold; `current` is left in place
    pub fn noop(path: DocumentPath, current: Option<Versioned<V>>) -> Self
    where
        V: Clone,
    {
        TreeUpdateOutcome {
            status: TreeUpdateStatus::Noop,
            path,
            old_value: current.clone(),
            new_value: current,
        }
    }

    /// The path is locked by a prepared transaction
    pub fn write_lock(path: DocumentPath) -> Self {
        Self::failure(TreeUpdateStatus::WriteLock, path)
    }

    /// The target or its parent does not exist
    pub fn invalid_path(path: DocumentPath) -> Self {
        Self::failure(TreeUpdateStatus::InvalidPath, path)
    }

    /// The mutation is not permitted on this node
    pub fn illegal_modification(path: DocumentPath) -> Self {
        Self::failure(TreeUpdateStatus::IllegalModification, path)
    }

    fn failure(status: TreeUpdateStatus, path: DocumentPath) -> Self {
        TreeUpdateOutcome {
            status,
            path,
            old_value: None,
            new_value: None,
        }
    }

    /// Outcome status
    pub fn status(&self) -> TreeUpdateStatus {
        self.status
    }

    /// Path the mutation targeted
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Node value before the mutation
    pub fn old_value(&self) -> Option<&Versioned<V>> {
        self.old_value.as_ref()
    }

    /// Node value after the mutation
    pub fn new_value(&self) -> Option<&Versioned<V>> {
        self.new_value.as_ref()
    }

    /// Whether the mutation was applied
    pub fn updated(&self) -> bool {
        self.status == TreeUpdateStatus::Ok
    }

    /// Whether the mutation was applied to a node that did not exist before
    pub fn created(&self) -> bool {
        self.updated() && self.old_value.is_none()
    }

    /// Whether the caller should retry
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    /// Consume the outcome, returning `(old_value, new_value)`
    pub fn into_values(self) -> (Option<Versioned<V>>, Option<Versioned<V>>) {
        (self.old_value, self.new_value)
    }

    /// Convert the carried values, keeping status and path
    pub fn try_map<U, E, F>(self, mut f: F) -> Result<TreeUpdateOutcome<U>, E>
    where
        F: FnMut(V) -> Result<U, E>,
    {
        Ok(TreeUpdateOutcome {
            status: self.status,
            path: self.path,
            old_value: self.old_value.map(|v| v.try_map(&mut f)).transpose()?,
            new_value: self.new_value.map(|v| v.try_map(&mut f)).transpose()?,
        })
    }
}

/// Result of removing a tree node
///
/// Removal is reported separately from writes because a successful removal
/// leaves no new value, while a successful `TreeUpdateOutcome` always has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveOutcome<V> {
    /// The node was removed; carries its last value
    Removed(Versioned<V>),
    /// The node was not removed
    Rejected(TreeUpdateStatus),
}

impl<V> RemoveOutcome<V> {
    /// Whether the node was removed
    pub fn is_removed(&self) -> bool {
        matches!(self, RemoveOutcome::Removed(_))
    }

    /// Status equivalent of this outcome
    pub fn status(&self) -> TreeUpdateStatus {
        match self {
            RemoveOutcome::Removed(_) => TreeUpdateStatus::Ok,
            RemoveOutcome::Rejected(status) => *status,
        }
    }

    /// Value of the removed node
    pub fn removed_value(&self) -> Option<&Versioned<V>> {
        match self {
            RemoveOutcome::Removed(value) => Some(value),
            RemoveOutcome::Rejected(_) => None,
        }
    }

    /// Convert the carried value
    pub fn try_map<U, E, F>(self, f: F) -> Result<RemoveOutcome<U>, E>
    where
        F: FnOnce(V) -> Result<U, E>,
    {
        Ok(match self {
            RemoveOutcome::Removed(value) => RemoveOutcome::Removed(value.try_map(f)?),
            RemoveOutcome::Rejected(status) => RemoveOutcome::Rejected(status),
        })
    }
}
