//! Document tree state machine
//!
//! The root node always exists, holds no value and can be neither written
//! nor removed. Every other node is created below an existing parent and can
//! only be removed once it has no children.
//!
//! Paths written by a prepared transaction are locked until it commits or
//! rolls back; plain writes to them resolve to `WriteLock`.

use crate::state_machine::{reply, Commit, ServiceContext, SessionId, StateMachine};
use quorum_concurrency::{CommitResult, PrepareResult, RollbackResult, TransactionId, TransactionLog};
use quorum_core::primitives::tree::{
    PathArgs, Remove, Update, ADD_LISTENER, BEGIN, CHANGE, CLEAR, COMMIT, GET, GET_CHILDREN,
    PREPARE, PREPARE_AND_COMMIT, REMOVE, REMOVE_LISTENER, ROLLBACK, UPDATE,
};
use quorum_core::primitives::{
    DocumentPath, DocumentTreeEvent, DocumentTreeEventKind, NodeUpdate, RemoveOutcome,
    TreeUpdateOutcome, TreeUpdateStatus,
};
use quorum_core::{Error, Result, Versioned};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

type Node = Versioned<Vec<u8>>;
type TreeLog = TransactionLog<NodeUpdate<Vec<u8>>>;

#[derive(Debug)]
struct TransactionScope {
    log: Option<TreeLog>,
}

/// Hierarchical store of versioned byte values
#[derive(Debug, Default)]
pub struct DocumentTreeService {
    nodes: BTreeMap<DocumentPath, Node>,
    listeners: HashMap<SessionId, Vec<DocumentPath>>,
    prepared_paths: HashSet<DocumentPath>,
    transactions: HashMap<TransactionId, TransactionScope>,
}

impl DocumentTreeService {
    /// Tree holding only the root
    pub fn new() -> Self {
        Self::default()
    }

    fn exists(&self, path: &DocumentPath) -> bool {
        path.is_root() || self.nodes.contains_key(path)
    }

    fn children(&self, path: &DocumentPath) -> BTreeMap<String, Node> {
        self.nodes
            .range(path.clone()..)
            .skip_while(|(p, _)| *p == path)
            .take_while(|(p, _)| p.is_descendant_of(path))
            .filter(|(p, _)| p.parent().as_ref() == Some(path))
            .map(|(p, node)| (p.name().to_string(), node.clone()))
            .collect()
    }

    fn descendants<'a>(&'a self, path: &'a DocumentPath) -> impl Iterator<Item = &'a DocumentPath> + 'a {
        self.nodes
            .range(path.clone()..)
            .map(|(p, _)| p)
            .skip_while(move |p| *p == path)
            .take_while(move |p| p.is_descendant_of(path))
    }

    fn has_children(&self, path: &DocumentPath) -> bool {
        // Descendants sort directly after their ancestor
        self.nodes
            .range(path.clone()..)
            .find(|(p, _)| *p != path)
            .map_or(false, |(p, _)| p.is_descendant_of(path))
    }

    fn update(
        &mut self,
        commit: &Commit<'_>,
        ctx: &mut ServiceContext,
        update: Update,
    ) -> Result<TreeUpdateOutcome<Vec<u8>>> {
        let Update {
            path,
            value,
            version_match,
            value_match,
        } = update;

        if path.is_root() {
            return Ok(TreeUpdateOutcome::illegal_modification(path));
        }
        let parent_locked = path
            .parent()
            .map_or(false, |p| self.prepared_paths.contains(&p));
        if self.prepared_paths.contains(&path) || parent_locked {
            return Ok(TreeUpdateOutcome::write_lock(path));
        }
        match path.parent() {
            Some(parent) if self.exists(&parent) => {}
            _ => return Ok(TreeUpdateOutcome::invalid_path(path)),
        }

        let current = self.nodes.get(&path).cloned();
        let version_holds = version_match.matches(current.as_ref().map(|n| &n.version));
        let value_holds = value_match.matches(current.as_ref().map(|n| &n.value));
        if !(version_holds && value_holds) {
            return Ok(TreeUpdateOutcome::noop(path, current));
        }

        let node = Versioned::with_timestamp(value, commit.index(), commit.time());
        self.nodes.insert(path.clone(), node.clone());
        let kind = if current.is_some() {
            DocumentTreeEventKind::Updated
        } else {
            DocumentTreeEventKind::Created
        };
        self.publish(
            ctx,
            vec![DocumentTreeEvent {
                path: path.clone(),
                kind,
                new_value: Some(node.clone()),
                old_value: current.clone(),
            }],
        )?;
        Ok(TreeUpdateOutcome::ok(path, current, node))
    }

    fn remove(&mut self, ctx: &mut ServiceContext, remove: Remove) -> Result<RemoveOutcome<Vec<u8>>> {
        let Remove {
            path,
            version_match,
        } = remove;

        if path.is_root() {
            return Ok(RemoveOutcome::Rejected(TreeUpdateStatus::IllegalModification));
        }
        if self.prepared_paths.contains(&path) {
            return Ok(RemoveOutcome::Rejected(TreeUpdateStatus::WriteLock));
        }
        let current = match self.nodes.get(&path) {
            Some(node) => node.clone(),
            None => return Ok(RemoveOutcome::Rejected(TreeUpdateStatus::InvalidPath)),
        };
        if self.has_children(&path) {
            return Ok(RemoveOutcome::Rejected(TreeUpdateStatus::IllegalModification));
        }
        if !version_match.matches(Some(&current.version)) {
            return Ok(RemoveOutcome::Rejected(TreeUpdateStatus::Noop));
        }

        self.nodes.remove(&path);
        self.publish(
            ctx,
            vec![DocumentTreeEvent {
                path,
                kind: DocumentTreeEventKind::Deleted,
                new_value: None,
                old_value: Some(current.clone()),
            }],
        )?;
        Ok(RemoveOutcome::Removed(current))
    }

    /// Remove every node not locked by a prepared transaction
    ///
    /// Ancestors of locked paths stay so the tree remains connected.
    fn clear(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let nodes = std::mem::take(&mut self.nodes);
        let (kept, mut removed): (Vec<(DocumentPath, Node)>, Vec<(DocumentPath, Node)>) =
            nodes.into_iter().partition(|(path, _)| {
                self.prepared_paths
                    .iter()
                    .any(|locked| locked.is_descendant_of(path))
            });
        self.nodes = kept.into_iter().collect();
        // Deepest nodes first, so every delete leaves a valid tree
        removed.sort_by(|(a, _), (b, _)| b.segments().len().cmp(&a.segments().len()).then(a.cmp(b)));
        let events = removed
            .into_iter()
            .map(|(path, node)| DocumentTreeEvent {
                path,
                kind: DocumentTreeEventKind::Deleted,
                new_value: None,
                old_value: Some(node),
            })
            .collect();
        self.publish(ctx, events)
    }

    /// Deliver each session the events below any path it listens to
    fn publish(&self, ctx: &mut ServiceContext, events: Vec<DocumentTreeEvent>) -> Result<()> {
        for (session, paths) in &self.listeners {
            let matching: Vec<&DocumentTreeEvent> = events
                .iter()
                .filter(|e| paths.iter().any(|p| e.path.is_descendant_of(p)))
                .collect();
            if !matching.is_empty() {
                ctx.publish(*session, CHANGE, &matching)?;
            }
        }
        Ok(())
    }

    fn prepare(&mut self, log: TreeLog) -> PrepareResult {
        let deleted: HashSet<&DocumentPath> = log
            .records()
            .iter()
            .filter(|r| matches!(r, NodeUpdate::Delete { .. }))
            .map(|r| r.path())
            .collect();
        let mut created = HashSet::new();
        for record in log.records() {
            let path = record.path();
            let parent_locked = path
                .parent()
                .map_or(false, |p| self.prepared_paths.contains(&p));
            if self.prepared_paths.contains(path) || parent_locked {
                return PrepareResult::ConcurrentTransaction;
            }
            let existing = self.nodes.get(path);
            let valid = match record {
                NodeUpdate::Create { .. } => {
                    let parent = path.parent();
                    let parent_exists = parent
                        .as_ref()
                        .map_or(false, |p| self.exists(p) || created.contains(p));
                    let parent_kept = parent.as_ref().map_or(false, |p| !deleted.contains(p));
                    existing.is_none() && parent_exists && parent_kept
                }
                NodeUpdate::Update { version, .. } => existing.map(|n| n.version) == Some(*version),
                NodeUpdate::Delete { version, .. } => {
                    // Children must go in the same transaction
                    existing.map(|n| n.version) == Some(*version)
                        && self.descendants(path).all(|d| deleted.contains(d))
                }
            };
            if !valid {
                return PrepareResult::OptimisticLockFailure;
            }
            if let NodeUpdate::Create { .. } = record {
                created.insert(path.clone());
            }
        }

        for record in log.records() {
            self.prepared_paths.insert(record.path().clone());
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

    fn release(&mut self, scope: TransactionScope) {
        if let Some(log) = scope.log {
            for record in log.records() {
                self.prepared_paths.remove(record.path());
            }
        }
    }

    fn apply_log(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext, log: TreeLog) -> Result<()> {
        debug!(target: "quorum::txn", transaction_id = %log.transaction_id(), records = log.len(), "Applying tree transaction");
        let mut events = Vec::with_capacity(log.len());
        for record in log.into_records() {
            self.prepared_paths.remove(record.path());
            let event = match record {
                NodeUpdate::Create { path, value } | NodeUpdate::Update { path, value, .. } => {
                    let node = Versioned::with_timestamp(value, commit.index(), commit.time());
                    let old_value = self.nodes.insert(path.clone(), node.clone());
                    DocumentTreeEvent {
                        path,
                        kind: if old_value.is_some() {
                            DocumentTreeEventKind::Updated
                        } else {
                            DocumentTreeEventKind::Created
                        },
                        new_value: Some(node),
                        old_value,
                    }
                }
                NodeUpdate::Delete { path, .. } => {
                    let old_value = self.nodes.remove(&path);
                    DocumentTreeEvent {
                        path,
                        kind: DocumentTreeEventKind::Deleted,
                        new_value: None,
                        old_value,
                    }
                }
            };
            events.push(event);
        }
        self.publish(ctx, events)
    }
}

impl StateMachine for DocumentTreeService {
    fn apply(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext) -> Result<Vec<u8>> {
        match commit.operation() {
            GET => {
                let PathArgs { path } = commit.args()?;
                reply(&self.nodes.get(&path))
            }
            GET_CHILDREN => {
                let PathArgs { path } = commit.args()?;
                let children = self.exists(&path).then(|| self.children(&path));
                reply(&children)
            }
            UPDATE => {
                let update: Update = commit.args()?;
                reply(&self.update(commit, ctx, update)?)
            }
            REMOVE => {
                let remove: Remove = commit.args()?;
                reply(&self.remove(ctx, remove)?)
            }
            CLEAR => {
                self.clear(ctx)?;
                reply(&())
            }
            ADD_LISTENER => {
                let PathArgs { path } = commit.args()?;
                self.listeners.entry(commit.session()).or_default().push(path);
                reply(&())
            }
            REMOVE_LISTENER => {
                let PathArgs { path } = commit.args()?;
                if let Some(paths) = self.listeners.get_mut(&commit.session()) {
                    if let Some(position) = paths.iter().position(|p| *p == path) {
                        paths.remove(position);
                    }
                    if paths.is_empty() {
                        self.listeners.remove(&commit.session());
                    }
                }
                reply(&())
            }
            BEGIN => {
                let transaction_id: TransactionId = commit.args()?;
                self.transactions
                    .insert(transaction_id, TransactionScope { log: None });
                reply(&commit.index())
            }
            PREPARE => {
                let log: TreeLog = commit.args()?;
                reply(&self.prepare(log))
            }
            PREPARE_AND_COMMIT => {
                let log: TreeLog = commit.args()?;
                let transaction_id = log.transaction_id().clone();
                let result = self.prepare(log);
                match (result, self.transactions.remove(&transaction_id)) {
                    (PrepareResult::Ok, Some(TransactionScope { log: Some(log) })) => {
                        self.apply_log(commit, ctx, log)?
                    }
                    (_, Some(scope)) => self.release(scope),
                    (_, None) => {}
                }
                reply(&result)
            }
            COMMIT => {
                let transaction_id: TransactionId = commit.args()?;
                let result = match self.transactions.remove(&transaction_id) {
                    None => CommitResult::UnknownTransactionId,
                    Some(TransactionScope { log: None }) => CommitResult::Failure,
                    Some(TransactionScope { log: Some(log) }) => {
                        self.apply_log(commit, ctx, log)?;
                        CommitResult::Ok
                    }
                };
                reply(&result)
            }
            ROLLBACK => {
                let transaction_id: TransactionId = commit.args()?;
                let result = match self.transactions.remove(&transaction_id) {
                    None => RollbackResult::UnknownTransactionId,
                    Some(scope) => {
                        self.release(scope);
                        RollbackResult::Ok
                    }
                };
                reply(&result)
            }
            other => Err(Error::UnknownOperation(other.id().to_string())),
        }
    }

    fn on_session_close(&mut self, session: SessionId, _ctx: &mut ServiceContext) {
        self.listeners.remove(&session);
    }
}
