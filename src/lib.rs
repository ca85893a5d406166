//! Quorum - client-side distributed primitives over a replicated session
//!
//! Quorum provides counters, ID generators, maps, registers, document trees
//! and leader election as thin clients over a session to a replicated state
//! machine. The consistency guarantees come from the state machine; the
//! clients add batching, event fan-out and transaction coordination.
//!
//! # Quick Start
//!
//! ```ignore
//! use quorum::{AtomicCounter, CounterService, IdGenerator, LocalService};
//!
//! // An in-process service standing in for the replicated log
//! let service = LocalService::new("ids", CounterService::new());
//!
//! // Reserve IDs 1000 at a time
//! let ids = IdGenerator::new(AtomicCounter::new(service.connect()), 1000)?;
//! let id = ids.next_id().await?;
//! ```
//!
//! # Architecture
//!
//! - `quorum-core`: errors, versioned values, operation names, the session
//!   handle and listener registries
//! - `quorum-concurrency`: transaction logs and the two-phase commit
//!   coordinator
//! - `quorum-session`: in-process session host and the primitive state
//!   machines
//! - `quorum-primitives`: the client primitives

pub use quorum_concurrency::{
    CommitResult, CommitStatus, Isolation, MapUpdate, PrepareResult, RollbackResult,
    TransactionCoordinator, TransactionId, TransactionLog, TransactionParticipant,
    TransactionalMapUpdate,
};
pub use quorum_core::primitives::{
    DocumentPath, DocumentTreeEvent, DocumentTreeEventKind, Leader, Leadership, LeadershipEvent,
    MapEvent, MapEventKind, NodeId, RemoveOutcome, TreeUpdateOutcome, TreeUpdateStatus,
};
pub use quorum_core::{Error, Listener, ReplicatedSession, Result, Versioned};
pub use quorum_primitives::{
    AtomicCounter, AtomicRegister, ConsistentMap, DocumentTree, IdGenerator, LeaderElector,
    PrimitivesConfig, RegisterEvent, TransactionalMap, TreeListener,
};
pub use quorum_session::{
    CounterService, DocumentTreeService, LeaderElectorService, LocalService, LocalSession,
    MapService,
};
