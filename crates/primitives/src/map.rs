//! ConsistentMap: replicated map of string keys to versioned byte values
//!
//! Every write resolves to an [`UpdateResult`] in the state machine; this
//! client turns it into the shape callers expect (prior value, success
//! flag, new entry). A write on a key locked by a prepared transaction
//! fails with `ConcurrentModification`.
//!
//! Change listeners share one session subscription; see
//! [`crate::subscription`].

use crate::subscription::{SessionSubscription, SubscriptionOps};
use quorum_concurrency::{CommitResult, MapUpdate, PrepareResult, RollbackResult, TransactionId, TransactionLog};
use quorum_core::primitives::map::{
    EntryArgs, KeyArgs, RemoveVersion, ReplaceValue, ReplaceVersion, ADD_LISTENER, BEGIN, CHANGE,
    CLEAR, COMMIT, CONTAINS_KEY, GET, KEY_SET, PREPARE, PREPARE_AND_COMMIT, PUT, PUT_IF_ABSENT,
    REMOVE, REMOVE_LISTENER, REMOVE_VALUE, REMOVE_VERSION, REPLACE, REPLACE_VALUE,
    REPLACE_VERSION, ROLLBACK, SIZE,
};
use quorum_core::primitives::{MapEvent, UpdateResult, UpdateStatus};
use quorum_core::{Error, Listener, OperationId, PrimitiveProxy, ReplicatedSession, Result, Versioned};
use serde::Serialize;
use std::sync::Arc;

/// Versioned map entry value
pub type Entry = Versioned<Vec<u8>>;

/// Transaction log accepted by the map state machine
pub type MapLog = TransactionLog<MapUpdate<String, Vec<u8>>>;

/// Distributed map with per-entry versions
///
/// Cheap to clone; clones share one session and one listener set.
#[derive(Clone)]
pub struct ConsistentMap {
    proxy: PrimitiveProxy,
    subscription: Arc<SessionSubscription<MapEvent>>,
}

impl ConsistentMap {
    /// Create a map over a session bound to a map state machine
    pub fn new(session: Arc<dyn ReplicatedSession>) -> Self {
        let proxy = PrimitiveProxy::new(session);
        let subscription = SessionSubscription::new(
            proxy.clone(),
            SubscriptionOps {
                event: CHANGE,
                add: ADD_LISTENER,
                remove: REMOVE_LISTENER,
            },
        );
        Self {
            proxy,
            subscription: Arc::new(subscription),
        }
    }

    /// Map name
    pub fn name(&self) -> &str {
        self.proxy.name()
    }

    async fn update<A>(&self, operation: OperationId, args: &A) -> Result<UpdateResult>
    where
        A: Serialize + Sync,
    {
        let result: UpdateResult = self.proxy.invoke(operation, args).await?;
        if result.status == UpdateStatus::WriteLock {
            return Err(Error::ConcurrentModification(format!(
                "key '{}' is locked by a prepared transaction",
                result.key
            )));
        }
        Ok(result)
    }

    /// Entry for `key`
    pub async fn get(&self, key: &str) -> Result<Option<Entry>> {
        self.proxy.invoke(GET, &key_args(key)).await
    }

    /// Whether `key` has an entry
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        self.proxy.invoke(CONTAINS_KEY, &key_args(key)).await
    }

    /// Number of entries
    pub async fn size(&self) -> Result<usize> {
        self.proxy.invoke_no_args(SIZE).await
    }

    /// Whether the map has no entries
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// All keys in order
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.proxy.invoke_no_args(KEY_SET).await
    }

    /// Write `value`, returning the prior entry
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<Option<Entry>> {
        Ok(self.update(PUT, &entry_args(key, value)).await?.old_value)
    }

    /// Write `value`, returning the new entry
    pub async fn put_and_get(&self, key: &str, value: Vec<u8>) -> Result<Entry> {
        self.update(PUT, &entry_args(key, value))
            .await?
            .new_value
            .ok_or_else(|| Error::remote(PUT.id(), "applied put returned no entry"))
    }

    /// Write `value` only if `key` is absent
    ///
    /// Returns the existing entry if there was one, `None` if the write
    /// happened.
    pub async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<Option<Entry>> {
        Ok(self.update(PUT_IF_ABSENT, &entry_args(key, value)).await?.old_value)
    }

    /// Remove `key`, returning the removed entry
    pub async fn remove(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.update(REMOVE, &key_args(key)).await?.old_value)
    }

    /// Remove `key` if its value equals `value`
    pub async fn remove_value(&self, key: &str, value: &[u8]) -> Result<bool> {
        let args = entry_args(key, value.to_vec());
        Ok(self.update(REMOVE_VALUE, &args).await?.updated())
    }

    /// Remove `key` if its version equals `version`
    pub async fn remove_version(&self, key: &str, version: u64) -> Result<bool> {
        let args = RemoveVersion {
            key: key.to_string(),
            version,
        };
        Ok(self.update(REMOVE_VERSION, &args).await?.updated())
    }

    /// Overwrite `key` only if it is present, returning the replaced entry
    pub async fn replace(&self, key: &str, value: Vec<u8>) -> Result<Option<Entry>> {
        let result = self.update(REPLACE, &entry_args(key, value)).await?;
        Ok(if result.updated() { result.old_value } else { None })
    }

    /// Overwrite `key` if its value equals `old_value`
    pub async fn replace_value(&self, key: &str, old_value: &[u8], new_value: Vec<u8>) -> Result<bool> {
        let args = ReplaceValue {
            key: key.to_string(),
            old_value: old_value.to_vec(),
            new_value,
        };
        Ok(self.update(REPLACE_VALUE, &args).await?.updated())
    }

    /// Overwrite `key` if its version equals `version`
    pub async fn replace_version(&self, key: &str, version: u64, value: Vec<u8>) -> Result<bool> {
        let args = ReplaceVersion {
            key: key.to_string(),
            version,
            value,
        };
        Ok(self.update(REPLACE_VERSION, &args).await?.updated())
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<()> {
        self.proxy.invoke_no_args(CLEAR).await
    }

    /// Register a change listener
    pub async fn add_listener(&self, listener: Arc<dyn Listener<MapEvent>>) -> Result<()> {
        self.subscription.add(listener).await
    }

    /// Remove a change listener
    pub async fn remove_listener(&self, listener: &Arc<dyn Listener<MapEvent>>) -> Result<()> {
        self.subscription.remove(listener).await
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.subscription.len()
    }

    // ========================================================================
    // Transaction participant commands
    // ========================================================================

    /// Open a transaction scope; returns the version the transaction reads at
    pub async fn begin(&self, transaction_id: &TransactionId) -> Result<u64> {
        self.proxy.invoke(BEGIN, transaction_id).await
    }

    /// Validate a log against committed state and lock its keys
    pub async fn prepare(&self, log: &MapLog) -> Result<PrepareResult> {
        self.proxy.invoke(PREPARE, log).await
    }

    /// Prepare and, if that succeeds, commit in one step
    pub async fn prepare_and_commit(&self, log: &MapLog) -> Result<PrepareResult> {
        self.proxy.invoke(PREPARE_AND_COMMIT, log).await
    }

    /// Apply a prepared transaction
    pub async fn commit(&self, transaction_id: &TransactionId) -> Result<CommitResult> {
        self.proxy.invoke(COMMIT, transaction_id).await
    }

    /// Discard a transaction and release its locks
    pub async fn rollback(&self, transaction_id: &TransactionId) -> Result<RollbackResult> {
        self.proxy.invoke(ROLLBACK, transaction_id).await
    }
}

impl std::fmt::Debug for ConsistentMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistentMap")
            .field("name", &self.name())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn key_args(key: &str) -> KeyArgs {
    KeyArgs {
        key: key.to_string(),
    }
}

fn entry_args(key: &str, value: Vec<u8>) -> EntryArgs {
    EntryArgs {
        key: key.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use quorum_core::primitives::MapEventKind;
    use quorum_session::{LocalService, MapService};

    fn map() -> (LocalService, ConsistentMap) {
        let service = LocalService::new("map", MapService::new());
        let map = ConsistentMap::new(service.connect());
        (service, map)
    }

    #[tokio::test]
    async fn test_put_returns_prior_entry() {
        let (_service, map) = map();
        assert_eq!(map.put("k", b"a".to_vec()).await.unwrap(), None);
        let prior = map.put("k", b"b".to_vec()).await.unwrap().unwrap();
        assert_eq!(prior.value, b"a".to_vec());
        assert_eq!(map.get("k").await.unwrap().unwrap().value, b"b".to_vec());
    }

    #[tokio::test]
    async fn test_put_if_absent_keeps_existing() {
        let (_service, map) = map();
        assert_eq!(map.put_if_absent("k", b"a".to_vec()).await.unwrap(), None);
        let existing = map.put_if_absent("k", b"b".to_vec()).await.unwrap().unwrap();
        assert_eq!(existing.value, b"a".to_vec());
        assert_eq!(map.get("k").await.unwrap().unwrap().value, b"a".to_vec());
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let (_service, map) = map();
        let entry = map.put_and_get("k", b"a".to_vec()).await.unwrap();

        assert!(!map.replace_value("k", b"x", b"b".to_vec()).await.unwrap());
        assert!(map.replace_value("k", b"a", b"b".to_vec()).await.unwrap());
        assert!(!map.replace_version("k", entry.version, b"c".to_vec()).await.unwrap());

        let current = map.get("k").await.unwrap().unwrap();
        assert!(map.replace_version("k", current.version, b"c".to_vec()).await.unwrap());
        assert!(!map.remove_value("k", b"b").await.unwrap());
        assert!(map.remove_value("k", b"c").await.unwrap());
        assert!(!map.contains_key("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_requires_present_key() {
        let (_service, map) = map();
        assert_eq!(map.replace("k", b"a".to_vec()).await.unwrap(), None);
        assert!(!map.contains_key("k").await.unwrap());
        map.put("k", b"a".to_vec()).await.unwrap();
        let replaced = map.replace("k", b"b".to_vec()).await.unwrap().unwrap();
        assert_eq!(replaced.value, b"a".to_vec());
    }

    #[tokio::test]
    async fn test_size_keys_and_clear() {
        let (_service, map) = map();
        assert!(map.is_empty().await.unwrap());
        map.put("b", vec![2]).await.unwrap();
        map.put("a", vec![1]).await.unwrap();
        assert_eq!(map.size().await.unwrap(), 2);
        assert_eq!(map.keys().await.unwrap(), vec!["a", "b"]);
        map.clear().await.unwrap();
        assert!(map.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_listeners_share_one_subscription() {
        let (service, map) = map();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let first: Arc<dyn Listener<MapEvent>> =
            Arc::new(move |e: &MapEvent| sink.lock().push((1, e.kind)));
        let sink = seen.clone();
        let second: Arc<dyn Listener<MapEvent>> =
            Arc::new(move |e: &MapEvent| sink.lock().push((2, e.kind)));

        map.add_listener(first.clone()).await.unwrap();
        map.add_listener(second.clone()).await.unwrap();
        assert_eq!(map.listener_count(), 2);
        assert_eq!(service.invocations(ADD_LISTENER), 1);

        map.put("k", vec![1]).await.unwrap();
        assert_eq!(
            *seen.lock(),
            vec![(1, MapEventKind::Insert), (2, MapEventKind::Insert)]
        );

        map.remove_listener(&first).await.unwrap();
        assert_eq!(service.invocations(REMOVE_LISTENER), 0);
        map.remove_listener(&second).await.unwrap();
        assert_eq!(service.invocations(REMOVE_LISTENER), 1);

        seen.lock().clear();
        map.remove("k").await.unwrap();
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscribe_leaves_no_listener() {
        let (service, map) = map();
        let listener: Arc<dyn Listener<MapEvent>> = Arc::new(|_: &MapEvent| {});
        service.fail_next(1);
        assert!(map.add_listener(listener.clone()).await.is_err());
        assert_eq!(map.listener_count(), 0);

        map.add_listener(listener).await.unwrap();
        assert_eq!(map.listener_count(), 1);
        assert_eq!(service.invocations(ADD_LISTENER), 2);
    }

    #[tokio::test]
    async fn test_write_to_prepared_key_is_concurrent_modification() {
        let (_service, map) = map();
        let transaction_id = TransactionId::new();
        let version = map.begin(&transaction_id).await.unwrap();
        let log = MapLog::new(
            transaction_id.clone(),
            version,
            vec![MapUpdate::PutIfVersionMatch {
                key: "k".to_string(),
                value: vec![1],
                version: 0,
            }],
        );
        assert_eq!(map.prepare(&log).await.unwrap(), PrepareResult::Ok);

        let err = map.put("k", vec![2]).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification(_)));

        assert_eq!(map.rollback(&transaction_id).await.unwrap(), RollbackResult::Ok);
        map.put("k", vec![2]).await.unwrap();
    }
}
