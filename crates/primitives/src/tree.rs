//! DocumentTree: hierarchical store of versioned values
//!
//! Writes are conditional and never fail for structural reasons: they
//! resolve to a [`TreeUpdateOutcome`] (or a [`RemoveOutcome`] for removals)
//! whose status tells the caller whether to retry (`WriteLock`), give up
//! (`InvalidPath`, `IllegalModification`) or accept that nothing changed
//! (`Noop`). Only remote and codec failures are errors.
//!
//! Listeners watch a subtree. Each listener registers its path with the
//! state machine; the session event handler is shared by all of them and
//! installed with the first.

use quorum_concurrency::{CommitResult, PrepareResult, RollbackResult, TransactionId, TransactionLog};
use quorum_core::primitives::tree::{
    Match, PathArgs, Remove, Update, ADD_LISTENER, BEGIN, CHANGE, CLEAR, COMMIT, GET, GET_CHILDREN,
    PREPARE, PREPARE_AND_COMMIT, REMOVE, REMOVE_LISTENER, ROLLBACK, UPDATE,
};
use quorum_core::primitives::{
    DocumentPath, DocumentTreeEvent, NodeUpdate, RemoveOutcome, TreeUpdateOutcome,
};
use quorum_core::{
    codec, same_listener, EventHandler, Listener, PrimitiveProxy, ReplicatedSession, Result,
    Versioned,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Listener of changes below a path
pub type TreeListener<V> = Arc<dyn Listener<DocumentTreeEvent<V>>>;

type Watchers<V> = RwLock<Vec<(DocumentPath, TreeListener<V>)>>;

/// Distributed document tree with values of type `V`
pub struct DocumentTree<V> {
    proxy: PrimitiveProxy,
    watchers: Arc<Watchers<V>>,
    handler: Mutex<Option<EventHandler>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> DocumentTree<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a tree over a session bound to a document tree state machine
    pub fn new(session: Arc<dyn ReplicatedSession>) -> Self {
        Self {
            proxy: PrimitiveProxy::new(session),
            watchers: Arc::new(RwLock::new(Vec::new())),
            handler: Mutex::new(None),
            _value: PhantomData,
        }
    }

    /// Tree name
    pub fn name(&self) -> &str {
        self.proxy.name()
    }

    /// Path of the root node
    pub fn root(&self) -> DocumentPath {
        DocumentPath::root()
    }

    /// Node at `path`
    pub async fn get(&self, path: &DocumentPath) -> Result<Option<Versioned<V>>> {
        let node: Option<Versioned<Vec<u8>>> = self.proxy.invoke(GET, &path_args(path)).await?;
        node.map(decode_versioned).transpose()
    }

    /// Direct children of `path` by name, `None` if `path` does not exist
    pub async fn get_children(
        &self,
        path: &DocumentPath,
    ) -> Result<Option<BTreeMap<String, Versioned<V>>>> {
        let children: Option<BTreeMap<String, Versioned<Vec<u8>>>> =
            self.proxy.invoke(GET_CHILDREN, &path_args(path)).await?;
        children
            .map(|children| {
                children
                    .into_iter()
                    .map(|(name, node)| Ok((name, decode_versioned(node)?)))
                    .collect::<Result<BTreeMap<_, _>>>()
            })
            .transpose()
    }

    async fn update(
        &self,
        path: &DocumentPath,
        value: &V,
        version_match: Match<u64>,
        value_match: Match<Vec<u8>>,
    ) -> Result<TreeUpdateOutcome<V>> {
        let args = Update {
            path: path.clone(),
            value: codec::encode(value)?,
            version_match,
            value_match,
        };
        let outcome: TreeUpdateOutcome<Vec<u8>> = self.proxy.invoke(UPDATE, &args).await?;
        outcome.try_map(|bytes| codec::decode(&bytes))
    }

    /// Create or overwrite the node at `path`
    pub async fn set(&self, path: &DocumentPath, value: &V) -> Result<TreeUpdateOutcome<V>> {
        self.update(path, value, Match::Any, Match::Any).await
    }

    /// Create the node at `path`; `Noop` if it already exists
    pub async fn create(&self, path: &DocumentPath, value: &V) -> Result<TreeUpdateOutcome<V>> {
        self.update(path, value, Match::Absent, Match::Any).await
    }

    /// Overwrite the node at `path` if it is at `version`
    pub async fn replace(
        &self,
        path: &DocumentPath,
        value: &V,
        version: u64,
    ) -> Result<TreeUpdateOutcome<V>> {
        self.update(path, value, Match::Value(version), Match::Any).await
    }

    /// Overwrite the node at `path` if its value equals `expected`
    pub async fn replace_value(
        &self,
        path: &DocumentPath,
        value: &V,
        expected: &V,
    ) -> Result<TreeUpdateOutcome<V>> {
        let expected = Match::Value(codec::encode(expected)?);
        self.update(path, value, Match::Any, expected).await
    }

    /// Remove the leaf node at `path`
    pub async fn remove_node(&self, path: &DocumentPath) -> Result<RemoveOutcome<V>> {
        self.remove(path, Match::Any).await
    }

    /// Remove the leaf node at `path` if it is at `version`
    pub async fn remove_version(&self, path: &DocumentPath, version: u64) -> Result<RemoveOutcome<V>> {
        self.remove(path, Match::Value(version)).await
    }

    async fn remove(&self, path: &DocumentPath, version_match: Match<u64>) -> Result<RemoveOutcome<V>> {
        let args = Remove {
            path: path.clone(),
            version_match,
        };
        let outcome: RemoveOutcome<Vec<u8>> = self.proxy.invoke(REMOVE, &args).await?;
        outcome.try_map(|bytes| codec::decode(&bytes))
    }

    /// Remove every node below the root
    pub async fn clear(&self) -> Result<()> {
        self.proxy.invoke_no_args(CLEAR).await
    }

    /// Watch `path` and everything below it
    pub async fn add_listener(&self, path: &DocumentPath, listener: TreeListener<V>) -> Result<()> {
        let mut handler = self.handler.lock().await;
        let installed = match handler.take() {
            Some(installed) => installed,
            None => self.install_handler(),
        };
        if let Err(e) = self.proxy.invoke::<_, ()>(ADD_LISTENER, &path_args(path)).await {
            if self.watchers.read().is_empty() {
                self.proxy.remove_event_listener(CHANGE, &installed);
            } else {
                *handler = Some(installed);
            }
            return Err(e);
        }
        self.watchers.write().push((path.clone(), listener));
        *handler = Some(installed);
        Ok(())
    }

    /// Stop a listener watching `path`
    pub async fn remove_listener(&self, path: &DocumentPath, listener: &TreeListener<V>) -> Result<()> {
        let mut handler = self.handler.lock().await;
        let now_empty = {
            let mut watchers = self.watchers.write();
            let position = watchers
                .iter()
                .position(|(p, l)| p == path && same_listener(l, listener));
            match position {
                Some(position) => {
                    watchers.remove(position);
                    watchers.is_empty()
                }
                None => return Ok(()),
            }
        };
        if now_empty {
            if let Some(installed) = handler.take() {
                self.proxy.remove_event_listener(CHANGE, &installed);
                debug!(target: "quorum::primitives", tree = %self.name(), "Session unsubscribed");
            }
        }
        self.proxy.invoke(REMOVE_LISTENER, &path_args(path)).await
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.watchers.read().len()
    }

    fn install_handler(&self) -> EventHandler {
        let watchers = self.watchers.clone();
        let name = self.name().to_string();
        debug!(target: "quorum::primitives", tree = %name, "Session subscribed");
        self.proxy
            .add_event_listener(CHANGE, move |events: Vec<DocumentTreeEvent>| {
                let snapshot = watchers.read().clone();
                for event in events {
                    let event = match event.try_map(|bytes| codec::decode::<V>(&bytes)) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(target: "quorum::primitives", tree = %name, error = %e, "Dropping undecodable tree event");
                            continue;
                        }
                    };
                    for (path, listener) in &snapshot {
                        if event.path.is_descendant_of(path) {
                            listener.event(&event);
                        }
                    }
                }
            })
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction scope; returns the version the transaction reads at
    pub async fn begin(&self, transaction_id: &TransactionId) -> Result<u64> {
        self.proxy.invoke(BEGIN, transaction_id).await
    }

    /// Validate a log of node updates and lock its paths
    pub async fn prepare(&self, log: TransactionLog<NodeUpdate<V>>) -> Result<PrepareResult> {
        self.proxy.invoke(PREPARE, &encode_log(log)?).await
    }

    /// Prepare and, if that succeeds, commit in one step
    pub async fn prepare_and_commit(&self, log: TransactionLog<NodeUpdate<V>>) -> Result<PrepareResult> {
        self.proxy.invoke(PREPARE_AND_COMMIT, &encode_log(log)?).await
    }

    /// Apply a prepared transaction
    pub async fn commit(&self, transaction_id: &TransactionId) -> Result<CommitResult> {
        self.proxy.invoke(COMMIT, transaction_id).await
    }

    /// Discard a transaction and unlock its paths
    pub async fn rollback(&self, transaction_id: &TransactionId) -> Result<RollbackResult> {
        self.proxy.invoke(ROLLBACK, transaction_id).await
    }
}

impl<V> std::fmt::Debug for DocumentTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTree")
            .field("name", &self.proxy.name())
            .finish()
    }
}

fn path_args(path: &DocumentPath) -> PathArgs {
    PathArgs { path: path.clone() }
}

fn decode_versioned<V: DeserializeOwned>(node: Versioned<Vec<u8>>) -> Result<Versioned<V>> {
    node.try_map(|bytes| codec::decode(&bytes))
}

fn encode_log<V: Serialize>(
    log: TransactionLog<NodeUpdate<V>>,
) -> Result<TransactionLog<NodeUpdate<Vec<u8>>>> {
    let transaction_id = log.transaction_id().clone();
    let version = log.version();
    let records = log
        .into_records()
        .into_iter()
        .map(|update| update.try_map(|value| codec::encode(&value)))
        .collect::<Result<Vec<_>>>()?;
    Ok(TransactionLog::new(transaction_id, version, records))
}
