//! Operations, conditions and events of the document tree state machine
//!
//! Node values are opaque bytes. Every node carries a version assigned by
//! the state machine. The root node always exists and holds no user value.

use super::document_path::DocumentPath;
use crate::contract::Versioned;
use crate::operation::{EventType, OperationId};
use serde::{Deserialize, Serialize};

/// Read one node
pub const GET: OperationId = OperationId::query("get");
/// Read the children of a node
pub const GET_CHILDREN: OperationId = OperationId::query("get_children");
/// Conditionally write a node; result is a `TreeUpdateOutcome<Vec<u8>>`
pub const UPDATE: OperationId = OperationId::command("update");
/// Conditionally remove a node; result is a `RemoveOutcome<Vec<u8>>`
pub const REMOVE: OperationId = OperationId::command("remove");
/// Remove every node below the root
pub const CLEAR: OperationId = OperationId::command("clear");
/// Subscribe the session to changes below a path
pub const ADD_LISTENER: OperationId = OperationId::command("add_listener");
/// Drop the session's subscription for a path
pub const REMOVE_LISTENER: OperationId = OperationId::command("remove_listener");

/// Start a transaction; payload is a transaction id, result is the log version
pub const BEGIN: OperationId = OperationId::command("begin");
/// Validate and lock a log of [`NodeUpdate`]s
pub const PREPARE: OperationId = OperationId::command("prepare");
/// Prepare and commit in one step
pub const PREPARE_AND_COMMIT: OperationId = OperationId::command("prepare_and_commit");
/// Apply a prepared transaction
pub const COMMIT: OperationId = OperationId::command("commit");
/// Discard a transaction
pub const ROLLBACK: OperationId = OperationId::command("rollback");

/// Batch of [`DocumentTreeEvent`]s pushed to subscribed sessions
pub const CHANGE: EventType = EventType::new("change");

/// Condition on the current state of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Match<T> {
    /// Holds for any state
    Any,
    /// Holds only if the node does not exist
    Absent,
    /// Holds only if the node exists with this value
    Value(T),
}

impl<T: PartialEq> Match<T> {
    /// Evaluate the condition against the current state
    pub fn matches(&self, current: Option<&T>) -> bool {
        match self {
            Match::Any => true,
            Match::Absent => current.is_none(),
            Match::Value(expected) => current == Some(expected),
        }
    }
}

/// Arguments naming a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathArgs {
    /// Target path
    pub path: DocumentPath,
}

/// Arguments of [`UPDATE`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Target path
    pub path: DocumentPath,
    /// Value to write
    pub value: Vec<u8>,
    /// Condition on the node's current version
    pub version_match: Match<u64>,
    /// Condition on the node's current value
    pub value_match: Match<Vec<u8>>,
}

/// Arguments of [`REMOVE`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remove {
    /// Target path
    pub path: DocumentPath,
    /// Condition on the node's current version
    pub version_match: Match<u64>,
}

/// One write of a tree transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeUpdate<V = Vec<u8>> {
    /// Create a node that must not exist yet
    Create {
        /// Target path
        path: DocumentPath,
        /// Node value
        value: V,
    },
    /// Overwrite a node that must be at `version`
    Update {
        /// Target path
        path: DocumentPath,
        /// Node value
        value: V,
        /// Expected current version
        version: u64,
    },
    /// Delete a node that must be at `version`
    Delete {
        /// Target path
        path: DocumentPath,
        /// Expected current version
        version: u64,
    },
}

impl<V> NodeUpdate<V> {
    /// Target path
    pub fn path(&self) -> &DocumentPath {
        match self {
            NodeUpdate::Create { path, .. }
            | NodeUpdate::Update { path, .. }
            | NodeUpdate::Delete { path, .. } => path,
        }
    }

    /// Value written, `None` for deletes
    pub fn value(&self) -> Option<&V> {
        match self {
            NodeUpdate::Create { value, .. } | NodeUpdate::Update { value, .. } => Some(value),
            NodeUpdate::Delete { .. } => None,
        }
    }

    /// Expected current version, `None` for creates
    pub fn version(&self) -> Option<u64> {
        match self {
            NodeUpdate::Create { .. } => None,
            NodeUpdate::Update { version, .. } | NodeUpdate::Delete { version, .. } => {
                Some(*version)
            }
        }
    }

    /// Convert the carried value
    pub fn try_map<U, E, F>(self, f: F) -> Result<NodeUpdate<U>, E>
    where
        F: FnOnce(V) -> Result<U, E>,
    {
        Ok(match self {
            NodeUpdate::Create { path, value } => NodeUpdate::Create {
                path,
                value: f(value)?,
            },
            NodeUpdate::Update {
                path,
                value,
                version,
            } => NodeUpdate::Update {
                path,
                value: f(value)?,
                version,
            },
            NodeUpdate::Delete { path, version } => NodeUpdate::Delete { path, version },
        })
    }
}

/// Kind of change carried by a [`DocumentTreeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentTreeEventKind {
    /// A node was created
    Created,
    /// A node's value changed
    Updated,
    /// A node was deleted
    Deleted,
}

/// Change notification for one tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTreeEvent<V = Vec<u8>> {
    /// Changed node
    pub path: DocumentPath,
    /// Kind of change
    pub kind: DocumentTreeEventKind,
    /// Node value after the change
    pub new_value: Option<Versioned<V>>,
    /// Node value before the change
    pub old_value: Option<Versioned<V>>,
}

impl<V> DocumentTreeEvent<V> {
    /// Convert the carried values
    pub fn try_map<U, E, F>(self, mut f: F) -> Result<DocumentTreeEvent<U>, E>
    where
        F: FnMut(V) -> Result<U, E>,
    {
        Ok(DocumentTreeEvent {
            path: self.path,
            kind: self.kind,
            new_value: self.new_value.map(|v| v.try_map(&mut f)).transpose()?,
            old_value: self.old_value.map(|v| v.try_map(&mut f)).transpose()?,
        })
    }
}
