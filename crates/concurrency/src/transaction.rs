//! Transaction identities, logs and phase results
//!
//! A transaction runs in two phases against each participating primitive:
//!
//! - `Prepare`: the state machine validates the transaction log and locks
//!   every key it touches.
//! - `Commit` / `Rollback`: the state machine applies or discards the log
//!   and releases the locks.
//!
//! Single-participant transactions use the combined `PrepareAndCommit`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh random transaction id
    pub fn new() -> Self {
        TransactionId(uuid::Uuid::new_v4().to_string())
    }

    /// Use an existing identifier
    pub fn from_string(id: impl Into<String>) -> Self {
        TransactionId(id.into())
    }

    /// Identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered records written by one transaction against one primitive
///
/// `version` is the state machine version returned when the transaction
/// began; records are applied in order on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog<T> {
    transaction_id: TransactionId,
    version: u64,
    records: Vec<T>,
}

impl<T> TransactionLog<T> {
    /// Create a log
    pub fn new(transaction_id: TransactionId, version: u64, records: Vec<T>) -> Self {
        Self {
            transaction_id,
            version,
            records,
        }
    }

    /// Owning transaction
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// State machine version at transaction begin
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Records in application order
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Consume the log, returning its records
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the log has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of the prepare phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareResult {
    /// Log validated and keys locked
    Ok,
    /// A record's expected version no longer matches
    OptimisticLockFailure,
    /// A key is already locked by another prepared transaction
    ConcurrentTransaction,
    /// The state machine had no record of the transaction beginning
    PartialFailure,
}

impl PrepareResult {
    /// Whether the transaction may proceed to commit
    pub fn is_ok(&self) -> bool {
        matches!(self, PrepareResult::Ok)
    }
}

/// Outcome of the commit phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitResult {
    /// Log applied
    Ok,
    /// No prepared transaction with this id
    UnknownTransactionId,
    /// The state machine could not apply the log
    Failure,
}

/// Outcome of the rollback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackResult {
    /// Transaction discarded
    Ok,
    /// No transaction with this id
    UnknownTransactionId,
}

/// Read isolation of a transactional view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Only written keys are validated at prepare
    #[default]
    ReadCommitted,
    /// Every key read must still be at its read version at prepare
    RepeatableRead,
}
