//! Operations, results and events of the consistent map state machine
//!
//! Keys are strings and values are opaque bytes. Every stored value carries
//! a version assigned by the state machine; versions start at 1, so an
//! expected version of 0 means "the key must be absent".

use crate::contract::Versioned;
use crate::operation::{EventType, OperationId};
use serde::{Deserialize, Serialize};

/// Read one entry
pub const GET: OperationId = OperationId::query("get");
/// Check whether a key is present
pub const CONTAINS_KEY: OperationId = OperationId::query("contains_key");
/// Count entries
pub const SIZE: OperationId = OperationId::query("size");
/// List keys
pub const KEY_SET: OperationId = OperationId::query("key_set");
/// Unconditionally write an entry
pub const PUT: OperationId = OperationId::command("put");
/// Write an entry only if the key is absent
pub const PUT_IF_ABSENT: OperationId = OperationId::command("put_if_absent");
/// Unconditionally remove an entry
pub const REMOVE: OperationId = OperationId::command("remove");
/// Remove an entry if its value matches
pub const REMOVE_VALUE: OperationId = OperationId::command("remove_value");
/// Remove an entry if its version matches
pub const REMOVE_VERSION: OperationId = OperationId::command("remove_version");
/// Replace an entry if the key is present
pub const REPLACE: OperationId = OperationId::command("replace");
/// Replace an entry if its value matches
pub const REPLACE_VALUE: OperationId = OperationId::command("replace_value");
/// Replace an entry if its version matches
pub const REPLACE_VERSION: OperationId = OperationId::command("replace_version");
/// Remove every entry
pub const CLEAR: OperationId = OperationId::command("clear");
/// Subscribe the session to [`CHANGE`] events
pub const ADD_LISTENER: OperationId = OperationId::command("add_listener");
/// Unsubscribe the session from [`CHANGE`] events
pub const REMOVE_LISTENER: OperationId = OperationId::command("remove_listener");

/// Start a transaction; payload is a transaction id, result is the log version
pub const BEGIN: OperationId = OperationId::command("begin");
/// Validate and lock a transaction log; result is a prepare result
pub const PREPARE: OperationId = OperationId::command("prepare");
/// Prepare and commit in one step; result is a prepare result
pub const PREPARE_AND_COMMIT: OperationId = OperationId::command("prepare_and_commit");
/// Apply a prepared transaction; payload is a transaction id
pub const COMMIT: OperationId = OperationId::command("commit");
/// Discard a transaction; payload is a transaction id
pub const ROLLBACK: OperationId = OperationId::command("rollback");

/// Batch of [`MapEvent`]s pushed to subscribed sessions
pub const CHANGE: EventType = EventType::new("change");

/// Arguments naming a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyArgs {
    /// Entry key
    pub key: String,
}

/// Arguments carrying a key and a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryArgs {
    /// Entry key
    pub key: String,
    /// Entry value
    pub value: Vec<u8>,
}

/// Arguments of [`REMOVE_VERSION`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveVersion {
    /// Entry key
    pub key: String,
    /// Expected current version
    pub version: u64,
}

/// Arguments of [`REPLACE_VALUE`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceValue {
    /// Entry key
    pub key: String,
    /// Expected current value
    pub old_value: Vec<u8>,
    /// Value to store if the expectation holds
    pub new_value: Vec<u8>,
}

/// Arguments of [`REPLACE_VERSION`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceVersion {
    /// Entry key
    pub key: String,
    /// Expected current version
    pub version: u64,
    /// Value to store if the expectation holds
    pub value: Vec<u8>,
}

/// Outcome status of a map write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// The write was applied
    Ok,
    /// The write was valid but changed nothing
    Noop,
    /// The key is locked by a prepared transaction
    WriteLock,
    /// The write's precondition did not hold
    PreconditionFailed,
}

/// Result of a map write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Outcome status
    pub status: UpdateStatus,
    /// Entry key
    pub key: String,
    /// Entry before the write
    pub old_value: Option<Versioned<Vec<u8>>>,
    /// Entry after the write
    pub new_value: Option<Versioned<Vec<u8>>>,
}

impl UpdateResult {
    /// Whether the write changed the map
    pub fn updated(&self) -> bool {
        self.status == UpdateStatus::Ok
    }
}

/// Kind of change carried by a [`MapEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapEventKind {
    /// A key was added
    Insert,
    /// An existing key's value changed
    Update,
    /// A key was removed
    Remove,
}

/// Change notification for one map entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEvent<V = Vec<u8>> {
    /// Changed key
    pub key: String,
    /// Kind of change
    pub kind: MapEventKind,
    /// Entry after the change
    pub new_value: Option<Versioned<V>>,
    /// Entry before the change
    pub old_value: Option<Versioned<V>>,
}

impl<V> MapEvent<V> {
    /// Build the event describing a transition between two entry states
    ///
    /// Returns `None` when neither state holds a value.
    pub fn between(
        key: String,
        old_value: Option<Versioned<V>>,
        new_value: Option<Versioned<V>>,
    ) -> Option<Self> {
        let kind = match (&old_value, &new_value) {
            (None, Some(_)) => MapEventKind::Insert,
            (Some(_), Some(_)) => MapEventKind::Update,
            (Some(_), None) => MapEventKind::Remove,
            (None, None) => return None,
        };
        Some(MapEvent {
            key,
            kind,
            new_value,
            old_value,
        })
    }
}
