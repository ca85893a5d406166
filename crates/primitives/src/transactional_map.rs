//! TransactionalMap: transaction-scoped view over a ConsistentMap
//!
//! ## Reads
//!
//! A read returns the transaction's own pending write for the key if there
//! is one. Otherwise it reads committed state: under `ReadCommitted` every
//! read goes to the map, under `RepeatableRead` the first read of a key is
//! cached and later reads return the cached entry.
//!
//! ## Writes
//!
//! Writes are buffered locally. Each write pins the version of the key it
//! replaces (0 if absent), and the transaction log turns buffered writes
//! into `PutIfVersionMatch` / `RemoveIfVersionMatch` records against those
//! versions. Under `RepeatableRead`, keys that were only read add a
//! `VersionMatch` record, so the transaction fails if any of them changed.
//!
//! ## Commit
//!
//! The map takes part in two-phase commit through
//! [`TransactionParticipant`]; drive it with a
//! [`TransactionCoordinator`](quorum_concurrency::TransactionCoordinator).

use crate::config::PrimitivesConfig;
use crate::map::{ConsistentMap, Entry, MapLog};
use async_trait::async_trait;
use parking_lot::Mutex;
use quorum_concurrency::{
    CommitResult, Isolation, MapUpdate, PrepareResult, RollbackResult, TransactionId,
    TransactionLog, TransactionParticipant,
};
use quorum_core::{codec, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Buffers {
    /// Committed entry of each key the transaction pinned, `None` if absent
    reads: BTreeMap<String, Option<Entry>>,
    /// Pending value of each written key, `None` for deletes
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

/// Map view whose writes commit atomically with other participants
pub struct TransactionalMap<V> {
    transaction_id: TransactionId,
    version: u64,
    isolation: Isolation,
    map: ConsistentMap,
    buffers: Mutex<Buffers>,
    _value: PhantomData<fn() -> V>,
}

impl<V> TransactionalMap<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open a transaction scope on `map`
    pub async fn begin(map: ConsistentMap, transaction_id: TransactionId, isolation: Isolation) -> Result<Self> {
        let version = map.begin(&transaction_id).await?;
        debug!(target: "quorum::txn", %transaction_id, map = %map.name(), version, ?isolation, "Transactional map opened");
        Ok(Self {
            transaction_id,
            version,
            isolation,
            map,
            buffers: Mutex::new(Buffers::default()),
            _value: PhantomData,
        })
    }

    /// Open a transaction scope using `[transactions] isolation`
    pub async fn begin_with_config(
        map: ConsistentMap,
        transaction_id: TransactionId,
        config: &PrimitivesConfig,
    ) -> Result<Self> {
        Self::begin(map, transaction_id, config.transactions.isolation).await
    }

    /// Transaction this view belongs to
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Isolation level of reads
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Value of `key` as this transaction sees it
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        if let Some(pending) = self.pending(key) {
            return decode_value(pending.as_deref());
        }
        let entry = match self.isolation {
            Isolation::ReadCommitted => self.map.get(key).await?,
            Isolation::RepeatableRead => self.pin(key).await?,
        };
        entry.map(|e| codec::decode(&e.value)).transpose()
    }

    /// Whether `key` has a value as this transaction sees it
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Buffer a write of `value`, returning the value it replaces
    pub async fn put(&self, key: &str, value: &V) -> Result<Option<V>> {
        let bytes = codec::encode(value)?;
        let prior = self.replaced(key).await?;
        self.buffers.lock().writes.insert(key.to_string(), Some(bytes));
        Ok(prior)
    }

    /// Buffer a write of `value` if `key` has no value
    ///
    /// Returns the existing value if there is one.
    pub async fn put_if_absent(&self, key: &str, value: &V) -> Result<Option<V>> {
        match self.get(key).await? {
            Some(existing) => Ok(Some(existing)),
            None => self.put(key, value).await,
        }
    }

    /// Buffer a delete of `key`, returning the value it removes
    pub async fn remove(&self, key: &str) -> Result<Option<V>> {
        let prior = self.replaced(key).await?;
        self.buffers.lock().writes.insert(key.to_string(), None);
        Ok(prior)
    }

    /// Buffer a write of `new_value` if `key` currently holds `old_value`
    pub async fn replace(&self, key: &str, old_value: &V, new_value: &V) -> Result<bool> {
        let current = self.get(key).await?;
        if !same_encoding(current.as_ref(), old_value)? {
            return Ok(false);
        }
        self.put(key, new_value).await?;
        Ok(true)
    }

    /// Build the log this transaction prepares with
    pub fn log(&self) -> MapLog {
        let buffers = self.buffers.lock();
        let version_of = |key: &str| {
            buffers
                .reads
                .get(key)
                .and_then(|entry| entry.as_ref().map(|e| e.version))
                .unwrap_or(0)
        };

        let mut records: Vec<MapUpdate<String, Vec<u8>>> = buffers
            .writes
            .iter()
            .map(|(key, value)| {
                let version = version_of(key);
                match value {
                    Some(value) => MapUpdate::PutIfVersionMatch {
                        key: key.clone(),
                        value: value.clone(),
                        version,
                    },
                    None => MapUpdate::RemoveIfVersionMatch {
                        key: key.clone(),
                        version,
                    },
                }
            })
            .collect();

        if self.isolation == Isolation::RepeatableRead {
            records.extend(
                buffers
                    .reads
                    .keys()
                    .filter(|key| !buffers.writes.contains_key(*key))
                    .map(|key| MapUpdate::VersionMatch {
                        key: key.clone(),
                        version: version_of(key),
                    }),
            );
        }
        TransactionLog::new(self.transaction_id.clone(), self.version, records)
    }

    fn pending(&self, key: &str) -> Option<Option<Vec<u8>>> {
        self.buffers.lock().writes.get(key).cloned()
    }

    /// Value a write to `key` replaces; pins the committed version it writes against
    async fn replaced(&self, key: &str) -> Result<Option<V>> {
        let pinned = self.pin(key).await?;
        match self.pending(key) {
            Some(pending) => decode_value(pending.as_deref()),
            None => pinned.map(|e| codec::decode(&e.value)).transpose(),
        }
    }

    /// Read `key` from committed state once and remember its entry
    async fn pin(&self, key: &str) -> Result<Option<Entry>> {
        let pinned = self.buffers.lock().reads.get(key).cloned();
        if let Some(pinned) = pinned {
            return Ok(pinned);
        }
        let entry = self.map.get(key).await?;
        Ok(self
            .buffers
            .lock()
            .reads
            .entry(key.to_string())
            .or_insert(entry)
            .clone())
    }
}

#[async_trait]
impl<V> TransactionParticipant for TransactionalMap<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn has_updates(&self) -> bool {
        let buffers = self.buffers.lock();
        !buffers.writes.is_empty()
            || (self.isolation == Isolation::RepeatableRead && !buffers.reads.is_empty())
    }

    async fn prepare(&self) -> Result<PrepareResult> {
        let log = self.log();
        let result = self.map.prepare(&log).await?;
        debug!(target: "quorum::txn", transaction_id = %self.transaction_id, map = %self.map.name(), records = log.len(), ?result, "Prepared");
        Ok(result)
    }

    async fn prepare_and_commit(&self) -> Result<PrepareResult> {
        let log = self.log();
        self.map.prepare_and_commit(&log).await
    }

    async fn commit(&self) -> Result<CommitResult> {
        self.map.commit(&self.transaction_id).await
    }

    async fn rollback(&self) -> Result<()> {
        let result = self.map.rollback(&self.transaction_id).await?;
        if result != RollbackResult::Ok {
            warn!(target: "quorum::txn", transaction_id = %self.transaction_id, map = %self.map.name(), ?result, "Rollback found no transaction");
        }
        Ok(())
    }
}

impl<V> std::fmt::Debug for TransactionalMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalMap")
            .field("transaction_id", &self.transaction_id)
            .field("map", &self.map.name())
            .field("isolation", &self.isolation)
            .finish()
    }
}

fn decode_value<V: DeserializeOwned>(bytes: Option<&[u8]>) -> Result<Option<V>> {
    bytes.map(codec::decode).transpose()
}

fn same_encoding<V: Serialize>(current: Option<&V>, expected: &V) -> Result<bool> {
    match current {
        Some(current) => Ok(codec::encode(current)? == codec::encode(expected)?),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_session::{LocalService, MapService};

    async fn open(isolation: Isolation) -> (ConsistentMap, TransactionalMap<String>) {
        let service = LocalService::new("map", MapService::new());
        let map = ConsistentMap::new(service.connect());
        let tx = TransactionalMap::begin(map.clone(), TransactionId::new(), isolation)
            .await
            .unwrap();
        (map, tx)
    }

    fn encoded(s: &str) -> Vec<u8> {
        codec::encode(s).unwrap()
    }

    #[tokio::test]
    async fn test_reads_see_own_writes() {
        let (map, tx) = open(Isolation::ReadCommitted).await;
        map.put("k", encoded("committed")).await.unwrap();

        assert_eq!(tx.put("k", &"mine".to_string()).await.unwrap(), Some("committed".to_string()));
        assert_eq!(tx.get("k").await.unwrap(), Some("mine".to_string()));
        assert_eq!(tx.remove("k").await.unwrap(), Some("mine".to_string()));
        assert_eq!(tx.get("k").await.unwrap(), None);

        // Nothing reaches the map before commit
        assert_eq!(map.get("k").await.unwrap().unwrap().value, encoded("committed"));
    }

    #[tokio::test]
    async fn test_log_pins_versions_of_written_keys() {
        let (map, tx) = open(Isolation::ReadCommitted).await;
        let existing = map.put_and_get("a", encoded("1")).await.unwrap();

        tx.put("a", &"2".to_string()).await.unwrap();
        tx.put("b", &"3".to_string()).await.unwrap();
        tx.get("c").await.unwrap();

        let log = tx.log();
        assert_eq!(
            log.records(),
            &[
                MapUpdate::PutIfVersionMatch {
                    key: "a".to_string(),
                    value: encoded("2"),
                    version: existing.version,
                },
                MapUpdate::PutIfVersionMatch {
                    key: "b".to_string(),
                    value: encoded("3"),
                    version: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_repeatable_read_records_read_versions() {
        let (map, tx) = open(Isolation::RepeatableRead).await;
        let existing = map.put_and_get("a", encoded("1")).await.unwrap();

        assert_eq!(tx.get("a").await.unwrap(), Some("1".to_string()));
        map.put("a", encoded("changed")).await.unwrap();
        // The cached read is repeated
        assert_eq!(tx.get("a").await.unwrap(), Some("1".to_string()));

        assert!(tx.has_updates());
        assert_eq!(
            tx.log().records(),
            &[MapUpdate::VersionMatch {
                key: "a".to_string(),
                version: existing.version,
            }]
        );
        assert_eq!(tx.prepare().await.unwrap(), PrepareResult::OptimisticLockFailure);
    }

    #[tokio::test]
    async fn test_read_committed_read_only_has_no_updates() {
        let (_map, tx) = open(Isolation::ReadCommitted).await;
        tx.get("a").await.unwrap();
        assert!(!tx.has_updates());
        assert!(tx.log().is_empty());
    }

    #[tokio::test]
    async fn test_replace_and_put_if_absent() {
        let (map, tx) = open(Isolation::ReadCommitted).await;
        map.put("k", encoded("a")).await.unwrap();

        assert!(!tx.replace("k", &"x".to_string(), &"b".to_string()).await.unwrap());
        assert!(tx.replace("k", &"a".to_string(), &"b".to_string()).await.unwrap());
        assert_eq!(
            tx.put_if_absent("k", &"c".to_string()).await.unwrap(),
            Some("b".to_string())
        );
        assert_eq!(tx.put_if_absent("new", &"c".to_string()).await.unwrap(), None);
        assert!(tx.contains_key("new").await.unwrap());
    }
}
