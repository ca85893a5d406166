//! Core types and traits for quorum
//!
//! This crate defines the foundational types shared by clients and state
//! machines:
//! - Error: Error type hierarchy
//! - Versioned: value plus logical version
//! - OperationId / EventType: names of remote operations and event streams
//! - ReplicatedSession: the session handle collaborator
//! - PrimitiveProxy: typed invoke/listen over a session
//! - Listener / ListenerRegistry: application-level event fan-out
//! - primitives: operations, results and events of every primitive

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod contract;
pub mod error;
pub mod listener;
pub mod operation;
pub mod primitives;
pub mod session;

pub use contract::{value_or_none, Timestamp, Versioned};
pub use error::{Error, Result};
pub use listener::{same_listener, Listener, ListenerRegistry};
pub use operation::{EventType, OperationId, OperationKind};
pub use session::{same_handler, EventHandler, PrimitiveProxy, ReplicatedSession};
