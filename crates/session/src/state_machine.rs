//! Deterministic state machine contract
//!
//! A state machine is applied one commit at a time, under a lock held by
//! the hosting service. It never blocks and never awaits: everything it
//! needs is in the [`Commit`] and everything it produces goes back through
//! its return value or the [`ServiceContext`] outbox.

use quorum_core::codec;
use quorum_core::{EventType, OperationId, Result, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Identifier of a client session within one service
pub type SessionId = u64;

/// One operation submitted to a state machine
#[derive(Debug, Clone, Copy)]
pub struct Commit<'a> {
    index: u64,
    time: Timestamp,
    session: SessionId,
    operation: OperationId,
    payload: &'a [u8],
}

impl<'a> Commit<'a> {
    pub(crate) fn new(
        index: u64,
        time: Timestamp,
        session: SessionId,
        operation: OperationId,
        payload: &'a [u8],
    ) -> Self {
        Commit {
            index,
            time,
            session,
            operation,
            payload,
        }
    }

    /// Log index of this commit
    ///
    /// Strictly increasing across commands, starting at 1. Queries observe
    /// the index of the last applied command.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wall-clock time recorded with this commit when it was sequenced
    ///
    /// Part of the log entry, so every replica applying the commit sees the
    /// same value. Never decreases across commands.
    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// Session that submitted the operation
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Submitted operation
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// Decode the operation's arguments
    pub fn args<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode(self.payload)
    }
}

/// Event queued for delivery to one session
#[derive(Debug, Clone)]
pub(crate) struct Publication {
    pub(crate) session: SessionId,
    pub(crate) event: EventType,
    pub(crate) payload: Vec<u8>,
}

/// Side-channel for events produced while applying a commit
///
/// Events are delivered by the hosting service after the state machine
/// lock is released, in the order they were published.
#[derive(Debug, Default)]
pub struct ServiceContext {
    outbox: Vec<Publication>,
}

impl ServiceContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an event for a session
    pub fn publish<T: Serialize + ?Sized>(
        &mut self,
        session: SessionId,
        event: EventType,
        payload: &T,
    ) -> Result<()> {
        self.outbox.push(Publication {
            session,
            event,
            payload: codec::encode(payload)?,
        });
        Ok(())
    }

    pub(crate) fn into_outbox(self) -> Vec<Publication> {
        self.outbox
    }
}

/// Replicated state machine hosted by a [`LocalService`](crate::LocalService)
pub trait StateMachine: Send + 'static {
    /// Apply one operation and return its encoded result
    ///
    /// Unknown operations must fail with `Error::UnknownOperation`.
    fn apply(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext) -> Result<Vec<u8>>;

    /// Release everything held by a session that has closed
    fn on_session_close(&mut self, _session: SessionId, _ctx: &mut ServiceContext) {}
}

/// Encode an operation result
pub fn reply<T: Serialize + ?Sized>(result: &T) -> Result<Vec<u8>> {
    codec::encode(result)
}
