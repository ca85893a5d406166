//! Operation and event identifiers
//!
//! An operation is a named request dispatched through the session handle.
//! The name selects both the remote handler and the argument/result
//! encoding. Commands mutate replicated state; queries only read it.

use std::fmt;

/// Whether an operation mutates replicated state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Mutates state; applied through the replicated log
    Command,
    /// Reads state without mutating it
    Query,
}

/// Identifier of a remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId {
    id: &'static str,
    kind: OperationKind,
}

impl OperationId {
    /// Define a command operation
    pub const fn command(id: &'static str) -> Self {
        OperationId {
            id,
            kind: OperationKind::Command,
        }
    }

    /// Define a query operation
    pub const fn query(id: &'static str) -> Self {
        OperationId {
            id,
            kind: OperationKind::Query,
        }
    }

    /// Operation name
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Operation kind
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Whether this operation mutates state
    pub fn is_command(&self) -> bool {
        self.kind == OperationKind::Command
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

/// Identifier of a pushed event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType(&'static str);

impl EventType {
    /// Define an event type
    pub const fn new(id: &'static str) -> Self {
        EventType(id)
    }

    /// Event name
    pub fn id(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
