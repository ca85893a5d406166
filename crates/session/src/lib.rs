//! In-process replicated session for quorum primitives
//!
//! This crate stands in for the replicated-log service in tests and local
//! deployments:
//! - `StateMachine`: deterministic state machine contract
//! - `LocalService` / `LocalSession`: single-process host implementing
//!   `ReplicatedSession`
//! - `services`: state machines for the counter, map, document tree and
//!   leader elector

#![warn(missing_docs)]
#![warn(clippy::all)]

mod local;
pub mod services;
mod state_machine;

pub use local::{LocalService, LocalSession};
pub use services::{CounterService, DocumentTreeService, LeaderElectorService, MapService};
pub use state_machine::{reply, Commit, ServiceContext, SessionId, StateMachine};
