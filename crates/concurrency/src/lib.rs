//! Transaction layer for quorum primitives
//!
//! This crate holds the client-side transaction model:
//! - `TransactionId`, `TransactionLog` and the prepare/commit/rollback results
//! - `MapUpdate`: one record of a pending map transaction
//! - `TransactionalMapUpdate`: lazily indexed post-commit view of a batch
//! - `TransactionCoordinator`: two-phase commit across participants
//!
//! Nothing here talks to a session directly; primitives implement
//! `TransactionParticipant` on top of their own remote operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod map_update;
pub mod transaction;
pub mod transactional_update;

pub use coordinator::{CommitStatus, TransactionCoordinator, TransactionParticipant};
pub use map_update::MapUpdate;
pub use transaction::{
    CommitResult, Isolation, PrepareResult, RollbackResult, TransactionId, TransactionLog,
};
pub use transactional_update::{PendingValue, TransactionalMapUpdate};
