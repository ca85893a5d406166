//! Payload types for every replicated primitive
//!
//! These types are shared between the client facades in `quorum-primitives`
//! and the state machines in `quorum-session`, so both sides agree on
//! operation names and on the shape of arguments, results and events.

pub mod counter;
pub mod document_path;
pub mod elector;
pub mod map;
pub mod tree;
pub mod tree_outcome;

pub use document_path::DocumentPath;
pub use elector::{Leader, Leadership, LeadershipEvent, NodeId};
pub use map::{MapEvent, MapEventKind, UpdateResult, UpdateStatus};
pub use tree::{DocumentTreeEvent, DocumentTreeEventKind, Match, NodeUpdate};
pub use tree_outcome::{RemoveOutcome, TreeUpdateOutcome, TreeUpdateStatus};
