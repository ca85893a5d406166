//! Client primitives for quorum
//!
//! Every primitive is a thin client over a [`ReplicatedSession`]: it encodes
//! typed arguments, invokes the remote state machine and decodes the
//! result. The interesting logic lives between the caller and the session:
//!
//! - **AtomicCounter**: read-modify-write `i64`
//! - **IdGenerator**: unique IDs drawn from reserved counter windows, one
//!   remote call per batch
//! - **ConsistentMap**: versioned key/value map with change events
//! - **AtomicRegister**: a value stored under one map key, republishing the
//!   map's events as register events over a single map listener
//! - **DocumentTree**: hierarchical store whose writes resolve to a closed
//!   set of outcomes instead of errors
//! - **LeaderElector**: per-topic leader election
//! - **TransactionalMap**: buffered map writes committed through two-phase
//!   commit
//!
//! ## Design Principle: Shared Sessions
//!
//! Primitives hold only a session handle (and, for derived primitives, the
//! primitive they are built on). Several primitives may share one session;
//! all consistency comes from the replicated state machine behind it.
//!
//! [`ReplicatedSession`]: quorum_core::ReplicatedSession

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod counter;
pub mod elector;
pub mod id_generator;
pub mod map;
pub mod register;
mod subscription;
pub mod transactional_map;
pub mod tree;

pub use config::PrimitivesConfig;
pub use counter::AtomicCounter;
pub use elector::LeaderElector;
pub use id_generator::IdGenerator;
pub use map::{ConsistentMap, Entry, MapLog};
pub use register::{AtomicRegister, RegisterEvent};
pub use transactional_map::TransactionalMap;
pub use tree::{DocumentTree, TreeListener};
