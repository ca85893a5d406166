//! Consistent map state machine
//!
//! Entries are versioned with the log index of the command that wrote them,
//! so versions start at 1 and an expected version of 0 means "absent".
//!
//! ## Transactions
//!
//! - `BEGIN` records a transaction scope at the current index.
//! - `PREPARE` validates every record against committed state and locks
//!   every written key. A key already locked by another prepared
//!   transaction is a `ConcurrentTransaction`; a conditional record whose
//!   expected version no longer matches is an `OptimisticLockFailure`.
//!   Preparing without `BEGIN` locks the keys but reports `PartialFailure`.
//! - `COMMIT` applies the post-commit value of every written key and
//!   releases the locks; `ROLLBACK` only releases them.
//!
//! Plain writes to a locked key resolve to `UpdateStatus::WriteLock`.

use crate::state_machine::{reply, Commit, ServiceContext, SessionId, StateMachine};
use quorum_concurrency::{
    CommitResult, MapUpdate, PendingValue, PrepareResult, RollbackResult, TransactionId,
    TransactionLog, TransactionalMapUpdate,
};
use quorum_core::primitives::map::{
    EntryArgs, KeyArgs, MapEvent, RemoveVersion, ReplaceValue, ReplaceVersion, UpdateResult,
    UpdateStatus, ADD_LISTENER, BEGIN, CHANGE, CLEAR, COMMIT, CONTAINS_KEY, GET, KEY_SET, PREPARE,
    PREPARE_AND_COMMIT, PUT, PUT_IF_ABSENT, REMOVE, REMOVE_LISTENER, REMOVE_VALUE, REMOVE_VERSION,
    REPLACE, REPLACE_VALUE, REPLACE_VERSION, ROLLBACK, SIZE,
};
use quorum_core::{Error, Result, Versioned};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

type Entry = Versioned<Vec<u8>>;
type MapLog = TransactionLog<MapUpdate<String, Vec<u8>>>;

/// Condition a plain write places on the current entry
#[derive(Debug)]
enum Precondition {
    Any,
    Absent,
    Present,
    Value(Vec<u8>),
    Version(u64),
}

impl Precondition {
    fn holds(&self, current: Option<&Entry>) -> bool {
        match self {
            Precondition::Any => true,
            Precondition::Absent => current.is_none(),
            Precondition::Present => current.is_some(),
            Precondition::Value(expected) => current.map(|e| &e.value) == Some(expected),
            Precondition::Version(expected) => current.map(|e| e.version) == Some(*expected),
        }
    }
}

#[derive(Debug)]
struct TransactionScope {
    log: Option<MapLog>,
}

/// String-keyed map of versioned byte values
#[derive(Debug, Default)]
pub struct MapService {
    entries: BTreeMap<String, Entry>,
    listeners: BTreeSet<SessionId>,
    prepared_keys: HashSet<String>,
    transactions: HashMap<TransactionId, TransactionScope>,
}

impl MapService {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    fn update(
        &mut self,
        commit: &Commit<'_>,
        ctx: &mut ServiceContext,
        key: String,
        value: Option<Vec<u8>>,
        precondition: Precondition,
    ) -> Result<UpdateResult> {
        let current = self.entries.get(&key).cloned();
        let rejected = |status| UpdateResult {
            status,
            key: key.clone(),
            old_value: current.clone(),
            new_value: current.clone(),
        };

        if current.is_none() && value.is_none() {
            return Ok(rejected(UpdateStatus::Noop));
        }
        if self.prepared_keys.contains(&key) {
            return Ok(rejected(UpdateStatus::WriteLock));
        }
        if !precondition.holds(current.as_ref()) {
            return Ok(rejected(UpdateStatus::PreconditionFailed));
        }

        let new_value = value.map(|v| Versioned::with_timestamp(v, commit.index(), commit.time()));
        match &new_value {
            Some(entry) => {
                self.entries.insert(key.clone(), entry.clone());
            }
            None => {
                self.entries.remove(&key);
            }
        }
        let events: Vec<MapEvent> =
            MapEvent::between(key.clone(), current.clone(), new_value.clone())
                .into_iter()
                .collect();
        self.publish(ctx, &events)?;

        Ok(UpdateResult {
            status: UpdateStatus::Ok,
            key,
            old_value: current,
            new_value,
        })
    }

    /// Remove every entry not locked by a prepared transaction
    fn clear(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let entries = std::mem::take(&mut self.entries);
        let (kept, removed): (BTreeMap<String, Entry>, BTreeMap<String, Entry>) = entries
            .into_iter()
            .partition(|(key, _)| self.prepared_keys.contains(key));
        self.entries = kept;
        let events: Vec<MapEvent> = removed
            .into_iter()
            .filter_map(|(key, entry)| MapEvent::between(key, Some(entry), None))
            .collect();
        self.publish(ctx, &events)
    }

    fn publish(&self, ctx: &mut ServiceContext, events: &[MapEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        for session in &self.listeners {
            ctx.publish(*session, CHANGE, events)?;
        }
        Ok(())
    }

    fn begin(&mut self, commit: &Commit<'_>, transaction_id: TransactionId) -> u64 {
        debug!(target: "quorum::txn", %transaction_id, version = commit.index(), "Map transaction begun");
        self.transactions
            .insert(transaction_id, TransactionScope { log: None });
        commit.index()
    }

    fn prepare(&mut self, log: MapLog) -> PrepareResult {
        for record in log.records() {
            let key = record.key();
            if self.prepared_keys.contains(key) {
                return PrepareResult::ConcurrentTransaction;
            }
            let current_version = self.entries.get(key).map(|e| e.version).unwrap_or(0);
            if let Some(expected) = record.version() {
                if expected != current_version {
                    return PrepareResult::OptimisticLockFailure;
                }
            }
        }

        for record in log.records().iter().filter(|r| r.is_write()) {
            self.prepared_keys.insert(record.key().clone());
        }

        let transaction_id = log.transaction_id().clone();
        match self.transactions.get_mut(&transaction_id) {
            Some(scope) => {
                scope.log = Some(log);
                PrepareResult::Ok
            }
            None => {
                self.transactions
                    .insert(transaction_id, TransactionScope { log: Some(log) });
                PrepareResult::PartialFailure
            }
        }
    }

    fn prepare_and_commit(
        &mut self,
        commit: &Commit<'_>,
        ctx: &mut ServiceContext,
        log: MapLog,
    ) -> Result<PrepareResult> {
        let transaction_id = log.transaction_id().clone();
        let result = self.prepare(log);
        let scope = self.transactions.remove(&transaction_id);
        match (result, scope) {
            (PrepareResult::Ok, Some(TransactionScope { log: Some(log) })) => {
                self.apply_log(commit, ctx, log)?;
            }
            (_, Some(scope)) => self.release(scope),
            (_, None) => {}
        }
        Ok(result)
    }

    fn commit(
        &mut self,
        commit: &Commit<'_>,
        ctx: &mut ServiceContext,
        transaction_id: &TransactionId,
    ) -> Result<CommitResult> {
        match self.transactions.remove(transaction_id) {
            None => Ok(CommitResult::UnknownTransactionId),
            Some(TransactionScope { log: None }) => Ok(CommitResult::Failure),
            Some(TransactionScope { log: Some(log) }) => {
                self.apply_log(commit, ctx, log)?;
                Ok(CommitResult::Ok)
            }
        }
    }

    fn rollback(&mut self, transaction_id: &TransactionId) -> RollbackResult {
        match self.transactions.remove(transaction_id) {
            None => RollbackResult::UnknownTransactionId,
            Some(scope) => {
                self.release(scope);
                RollbackResult::Ok
            }
        }
    }

    fn release(&mut self, scope: TransactionScope) {
        if let Some(log) = scope.log {
            for record in log.records().iter().filter(|r| r.is_write()) {
                self.prepared_keys.remove(record.key());
            }
        }
    }

    fn apply_log(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext, log: MapLog) -> Result<()> {
        let update = TransactionalMapUpdate::from(log);
        debug!(target: "quorum::txn", transaction_id = %update.transaction_id(), records = update.batch().len(), "Applying map transaction");

        let mut applied = HashSet::new();
        let mut events = Vec::new();
        for record in update.batch().iter().filter(|r| r.is_write()) {
            let key = record.key();
            self.prepared_keys.remove(key);
            if !applied.insert(key.as_str()) {
                continue;
            }
            let (old_value, new_value) = match update.pending(key.as_str()) {
                PendingValue::Written(value) => {
                    let entry = Versioned::with_timestamp(value.clone(), commit.index(), commit.time());
                    (self.entries.insert(key.clone(), entry.clone()), Some(entry))
                }
                PendingValue::Deleted => (self.entries.remove(key), None),
                PendingValue::Untouched => continue,
            };
            events.extend(MapEvent::between(key.clone(), old_value, new_value));
        }
        self.publish(ctx, &events)
    }
}

impl StateMachine for MapService {
    fn apply(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext) -> Result<Vec<u8>> {
        match commit.operation() {
            GET => {
                let KeyArgs { key } = commit.args()?;
                reply(&self.entries.get(&key))
            }
            CONTAINS_KEY => {
                let KeyArgs { key } = commit.args()?;
                reply(&self.entries.contains_key(&key))
            }
            SIZE => reply(&self.entries.len()),
            KEY_SET => reply(&self.entries.keys().collect::<Vec<_>>()),
            PUT => {
                let EntryArgs { key, value } = commit.args()?;
                reply(&self.update(commit, ctx, key, Some(value), Precondition::Any)?)
            }
            PUT_IF_ABSENT => {
                let EntryArgs { key, value } = commit.args()?;
                reply(&self.update(commit, ctx, key, Some(value), Precondition::Absent)?)
            }
            REMOVE => {
                let KeyArgs { key } = commit.args()?;
                reply(&self.update(commit, ctx, key, None, Precondition::Any)?)
            }
            REMOVE_VALUE => {
                let EntryArgs { key, value } = commit.args()?;
                reply(&self.update(commit, ctx, key, None, Precondition::Value(value))?)
            }
            REMOVE_VERSION => {
                let RemoveVersion { key, version } = commit.args()?;
                reply(&self.update(commit, ctx, key, None, Precondition::Version(version))?)
            }
            REPLACE => {
                let EntryArgs { key, value } = commit.args()?;
                reply(&self.update(commit, ctx, key, Some(value), Precondition::Present)?)
            }
            REPLACE_VALUE => {
                let ReplaceValue {
                    key,
                    old_value,
                    new_value,
                } = commit.args()?;
                let precondition = Precondition::Value(old_value);
                reply(&self.update(commit, ctx, key, Some(new_value), precondition)?)
            }
            REPLACE_VERSION => {
                let ReplaceVersion {
                    key,
                    version,
                    value,
                } = commit.args()?;
                let precondition = Precondition::Version(version);
                reply(&self.update(commit, ctx, key, Some(value), precondition)?)
            }
            CLEAR => {
                self.clear(ctx)?;
                reply(&())
            }
            ADD_LISTENER => {
                self.listeners.insert(commit.session());
                reply(&())
            }
            REMOVE_LISTENER => {
                self.listeners.remove(&commit.session());
                reply(&())
            }
            BEGIN => {
                let transaction_id: TransactionId = commit.args()?;
                reply(&self.begin(commit, transaction_id))
            }
            PREPARE => {
                let log: MapLog = commit.args()?;
                reply(&self.prepare(log))
            }
            PREPARE_AND_COMMIT => {
                let log: MapLog = commit.args()?;
                reply(&self.prepare_and_commit(commit, ctx, log)?)
            }
            COMMIT => {
                let transaction_id: TransactionId = commit.args()?;
                reply(&self.commit(commit, ctx, &transaction_id)?)
            }
            ROLLBACK => {
                let transaction_id: TransactionId = commit.args()?;
                reply(&self.rollback(&transaction_id))
            }
            other => Err(Error::UnknownOperation(other.id().to_string())),
        }
    }

    fn on_session_close(&mut self, session: SessionId, _ctx: &mut ServiceContext) {
        self.listeners.remove(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &[u8], version: u64) -> MapUpdate<String, Vec<u8>> {
        MapUpdate::PutIfVersionMatch {
            key: key.to_string(),
            value: value.to_vec(),
            version,
        }
    }

    #[test]
    fn test_precondition_matching() {
        let entry = Versioned::new(b"v".to_vec(), 3);
        assert!(Precondition::Any.holds(None));
        assert!(Precondition::Absent.holds(None));
        assert!(!Precondition::Absent.holds(Some(&entry)));
        assert!(Precondition::Present.holds(Some(&entry)));
        assert!(Precondition::Value(b"v".to_vec()).holds(Some(&entry)));
        assert!(!Precondition::Value(b"w".to_vec()).holds(Some(&entry)));
        assert!(Precondition::Version(3).holds(Some(&entry)));
        assert!(!Precondition::Version(3).holds(None));
    }

    #[test]
    fn test_prepare_locks_written_keys_only() {
        let mut service = MapService::new();
        let id = TransactionId::from_string("tx");
        service
            .transactions
            .insert(id.clone(), TransactionScope { log: None });
        let log = TransactionLog::new(
            id,
            1,
            vec![
                put("a", b"1", 0),
                MapUpdate::VersionMatch {
                    key: "b".to_string(),
                    version: 0,
                },
            ],
        );
        assert_eq!(service.prepare(log), PrepareResult::Ok);
        assert!(service.prepared_keys.contains("a"));
        assert!(!service.prepared_keys.contains("b"));
    }

    #[test]
    fn test_prepare_without_begin_is_partial_failure() {
        let mut service = MapService::new();
        let log = TransactionLog::new(TransactionId::new(), 1, vec![put("a", b"1", 0)]);
        assert_eq!(service.prepare(log), PrepareResult::PartialFailure);
    }

    #[test]
    fn test_prepare_detects_stale_version() {
        let mut service = MapService::new();
        service
            .entries
            .insert("a".to_string(), Versioned::new(b"x".to_vec(), 4));
        let log = TransactionLog::new(TransactionId::new(), 1, vec![put("a", b"1", 3)]);
        assert_eq!(service.prepare(log), PrepareResult::OptimisticLockFailure);
        assert!(service.prepared_keys.is_empty());
    }
}
