//! Two-phase commit across transaction participants
//!
//! Each primitive touched by a transaction contributes one participant that
//! owns its pending log. The coordinator drives the participants:
//!
//! - no participant has updates: nothing to do, success
//! - exactly one participant has updates: `prepare_and_commit`
//! - otherwise: `prepare` every participant; if all succeed `commit` every
//!   participant, else `rollback` every participant
//!
//! Remote failures during prepare roll the transaction back and propagate
//! the error to the caller. Once every participant is prepared, `commit` is
//! attempted on all of them even if one fails; failed participants are then
//! rolled back so no lock outlives the transaction, and the first error (or
//! failing commit result) is reported.

use crate::transaction::{CommitResult, PrepareResult, TransactionId};
use async_trait::async_trait;
use quorum_core::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One primitive's share of a transaction
#[async_trait]
pub trait TransactionParticipant: Send + Sync {
    /// Whether this participant recorded any updates
    fn has_updates(&self) -> bool;

    /// Validate and lock this participant's log
    async fn prepare(&self) -> Result<PrepareResult>;

    /// Validate, lock and apply this participant's log in one step
    async fn prepare_and_commit(&self) -> Result<PrepareResult>;

    /// Apply a prepared log
    async fn commit(&self) -> Result<CommitResult>;

    /// Discard the log and release locks
    async fn rollback(&self) -> Result<()>;
}

/// Final status of a coordinated commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Every participant applied its log
    Success,
    /// The transaction was rolled back; carries the failing prepare result
    Failure(PrepareResult),
    /// Every participant prepared but at least one did not apply its log;
    /// carries the first failing commit result
    CommitFailure(CommitResult),
}

impl CommitStatus {
    /// Whether the transaction committed
    pub fn is_success(&self) -> bool {
        matches!(self, CommitStatus::Success)
    }
}

/// Drives two-phase commit and keeps commit metrics
///
/// Metric counters use Relaxed ordering; they are observational only.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a transaction across its participants
    pub async fn commit(
        &self,
        transaction_id: &TransactionId,
        participants: &[Arc<dyn TransactionParticipant>],
    ) -> Result<CommitStatus> {
        let active: Vec<&Arc<dyn TransactionParticipant>> =
            participants.iter().filter(|p| p.has_updates()).collect();

        let status = match active.as_slice() {
            [] => {
                debug!(target: "quorum::txn", %transaction_id, "Nothing to commit");
                Ok(CommitStatus::Success)
            }
            [single] => {
                debug!(target: "quorum::txn", %transaction_id, "Single participant, prepare_and_commit");
                single.prepare_and_commit().await.map(|result| match result {
                    PrepareResult::Ok => CommitStatus::Success,
                    failure => CommitStatus::Failure(failure),
                })
            }
            many => self.two_phase(transaction_id, many).await,
        };

        match status {
            Ok(CommitStatus::Success) => self.total_committed.fetch_add(1, Ordering::Relaxed),
            _ => self.total_aborted.fetch_add(1, Ordering::Relaxed),
        };
        status
    }

    async fn two_phase(
        &self,
        transaction_id: &TransactionId,
        participants: &[&Arc<dyn TransactionParticipant>],
    ) -> Result<CommitStatus> {
        debug!(target: "quorum::txn", %transaction_id, participants = participants.len(), "Preparing");

        let mut failure = None;
        for participant in participants {
            match participant.prepare().await {
                Ok(PrepareResult::Ok) => {}
                Ok(result) => {
                    failure = Some(Ok(result));
                    break;
                }
                Err(e) => {
                    failure = Some(Err(e));
                    break;
                }
            }
        }

        if let Some(failure) = failure {
            warn!(target: "quorum::txn", %transaction_id, ?failure, "Prepare failed, rolling back");
            self.rollback_all(transaction_id, participants).await;
            return failure.map(CommitStatus::Failure);
        }

        debug!(target: "quorum::txn", %transaction_id, "Committing");
        let mut failed = Vec::new();
        let mut first_error = None;
        let mut first_result = None;
        for participant in participants {
            match participant.commit().await {
                Ok(CommitResult::Ok) => {}
                Ok(result) => {
                    warn!(target: "quorum::txn", %transaction_id, ?result, "Participant failed to commit");
                    first_result.get_or_insert(result);
                    failed.push(*participant);
                }
                Err(e) => {
                    warn!(target: "quorum::txn", %transaction_id, error = %e, "Participant commit errored");
                    first_error.get_or_insert(e);
                    failed.push(*participant);
                }
            }
        }

        if !failed.is_empty() {
            // Releases whatever the failed commits left locked
            self.rollback_all(transaction_id, &failed).await;
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(first_result.map_or(CommitStatus::Success, CommitStatus::CommitFailure))
    }

    async fn rollback_all(
        &self,
        transaction_id: &TransactionId,
        participants: &[&Arc<dyn TransactionParticipant>],
    ) {
        for participant in participants {
            if let Err(e) = participant.rollback().await {
                warn!(target: "quorum::txn", %transaction_id, error = %e, "Rollback failed");
            }
        }
    }

    /// Number of transactions that committed
    pub fn total_committed(&self) -> u64 {
        self.total_committed.load(Ordering::Relaxed)
    }

    /// Number of transactions that rolled back or failed to commit
    pub fn total_aborted(&self) -> u64 {
        self.total_aborted.load(Ordering::Relaxed)
    }
}
