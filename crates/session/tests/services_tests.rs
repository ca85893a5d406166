//! State machine behaviour through a local session
//!
//! These tests drive each service through `PrimitiveProxy`, exactly as the
//! client primitives do, and check the replies and pushed events.

use parking_lot::Mutex;
use quorum_concurrency::{
    CommitResult, MapUpdate, PrepareResult, RollbackResult, TransactionId, TransactionLog,
};
use quorum_core::primitives::map::{self, EntryArgs, KeyArgs, MapEvent, UpdateResult, UpdateStatus};
use quorum_core::primitives::tree::{self, Match, PathArgs, Remove, Update};
use quorum_core::primitives::elector::{self, NodeArgs, TopicArgs, TopicNodeArgs};
use quorum_core::primitives::{
    counter, DocumentPath, DocumentTreeEvent, Leadership, LeadershipEvent, NodeId, NodeUpdate,
    RemoveOutcome, TreeUpdateOutcome, TreeUpdateStatus,
};
use quorum_core::{PrimitiveProxy, Versioned};
use quorum_session::{
    CounterService, DocumentTreeService, LeaderElectorService, LocalService, MapService,
};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

/// Print `quorum::*` logs when running with `--nocapture`
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn proxy(service: &LocalService) -> PrimitiveProxy {
    PrimitiveProxy::new(service.connect())
}

fn path(s: &str) -> DocumentPath {
    s.parse().unwrap()
}

async fn put(map: &PrimitiveProxy, key: &str, value: &[u8]) -> UpdateResult {
    map.invoke(
        map::PUT,
        &EntryArgs {
            key: key.to_string(),
            value: value.to_vec(),
        },
    )
    .await
    .unwrap()
}

async fn get(map: &PrimitiveProxy, key: &str) -> Option<Versioned<Vec<u8>>> {
    map.invoke(map::GET, &KeyArgs { key: key.to_string() })
        .await
        .unwrap()
}

async fn get_node(tree: &PrimitiveProxy, p: &str) -> Option<Versioned<Vec<u8>>> {
    tree.invoke(tree::GET, &PathArgs { path: path(p) })
        .await
        .unwrap()
}

async fn set_node(tree: &PrimitiveProxy, p: &str, value: &[u8]) -> TreeUpdateOutcome<Vec<u8>> {
    tree.invoke(
        tree::UPDATE,
        &Update {
            path: path(p),
            value: value.to_vec(),
            version_match: Match::Any,
            value_match: Match::Any,
        },
    )
    .await
    .unwrap()
}

// ============================================================================
// Counter
// ============================================================================

#[tokio::test]
async fn test_counter_get_and_add_returns_prior_value() {
    let service = LocalService::new("ids", CounterService::new());
    let counter = proxy(&service);

    let first: i64 = counter
        .invoke(counter::GET_AND_ADD, &counter::GetAndAdd { delta: 5 })
        .await
        .unwrap();
    let second: i64 = counter
        .invoke(counter::GET_AND_ADD, &counter::GetAndAdd { delta: 5 })
        .await
        .unwrap();
    let current: i64 = counter.invoke_no_args(counter::GET).await.unwrap();

    assert_eq!((first, second, current), (0, 5, 10));
}

// ============================================================================
// Map
// ============================================================================

#[tokio::test]
async fn test_map_versions_come_from_the_log() {
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);

    let first = put(&map, "a", b"1").await;
    let second = put(&map, "a", b"2").await;

    assert_eq!(first.status, UpdateStatus::Ok);
    assert_eq!(first.new_value.as_ref().unwrap().version, 1);
    assert_eq!(second.old_value.as_ref().unwrap().value, b"1".to_vec());
    assert_eq!(second.new_value.as_ref().unwrap().version, 2);
}

#[tokio::test]
async fn test_map_remove_of_absent_key_is_noop() {
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);
    let result: UpdateResult = map
        .invoke(map::REMOVE, &KeyArgs { key: "x".into() })
        .await
        .unwrap();
    assert_eq!(result.status, UpdateStatus::Noop);
}

#[tokio::test]
async fn test_map_events_only_reach_subscribed_sessions() {
    let service = LocalService::new("map", MapService::new());
    let subscriber = proxy(&service);
    let writer = proxy(&service);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    subscriber.add_event_listener(map::CHANGE, move |events: Vec<MapEvent>| {
        sink.lock().extend(events)
    });
    put(&writer, "before", b"x").await;
    subscriber
        .invoke_no_args::<()>(map::ADD_LISTENER)
        .await
        .unwrap();
    put(&writer, "after", b"y").await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].key, "after");
}

#[tokio::test]
async fn test_map_transaction_commit_and_write_lock() {
    init_tracing();
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);
    put(&map, "a", b"old").await;

    let id = TransactionId::new();
    let version: u64 = map.invoke(map::BEGIN, &id).await.unwrap();
    let log = TransactionLog::new(
        id.clone(),
        version,
        vec![
            MapUpdate::PutIfVersionMatch {
                key: "a".to_string(),
                value: b"new".to_vec(),
                version: 1,
            },
            MapUpdate::PutIfVersionMatch {
                key: "b".to_string(),
                value: b"created".to_vec(),
                version: 0,
            },
        ],
    );
    let prepared: PrepareResult = map.invoke(map::PREPARE, &log).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);

    // Prepared keys reject plain writes until commit
    let locked = put(&map, "a", b"sneaky").await;
    assert_eq!(locked.status, UpdateStatus::WriteLock);

    let committed: CommitResult = map.invoke(map::COMMIT, &id).await.unwrap();
    assert_eq!(committed, CommitResult::Ok);
    assert_eq!(get(&map, "a").await.unwrap().value, b"new".to_vec());
    assert_eq!(get(&map, "b").await.unwrap().value, b"created".to_vec());
    assert_eq!(put(&map, "a", b"free").await.status, UpdateStatus::Ok);
}

#[tokio::test]
async fn test_map_transaction_conflicts() {
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);
    put(&map, "a", b"v1").await;

    let first = TransactionId::new();
    let second = TransactionId::new();
    let v1: u64 = map.invoke(map::BEGIN, &first).await.unwrap();
    let v2: u64 = map.invoke(map::BEGIN, &second).await.unwrap();
    let write_a = |id: &TransactionId, version: u64| {
        TransactionLog::new(
            id.clone(),
            version,
            vec![MapUpdate::PutIfVersionMatch {
                key: "a".to_string(),
                value: b"tx".to_vec(),
                version: 1,
            }],
        )
    };

    let ok: PrepareResult = map.invoke(map::PREPARE, &write_a(&first, v1)).await.unwrap();
    let conflict: PrepareResult = map.invoke(map::PREPARE, &write_a(&second, v2)).await.unwrap();
    assert_eq!(ok, PrepareResult::Ok);
    assert_eq!(conflict, PrepareResult::ConcurrentTransaction);

    let rolled_back: RollbackResult = map.invoke(map::ROLLBACK, &first).await.unwrap();
    assert_eq!(rolled_back, RollbackResult::Ok);

    // A write after the read makes the second transaction stale
    put(&map, "a", b"v2").await;
    let stale: PrepareResult = map.invoke(map::PREPARE, &write_a(&second, v2)).await.unwrap();
    assert_eq!(stale, PrepareResult::OptimisticLockFailure);

    let unknown: CommitResult = map.invoke(map::COMMIT, &TransactionId::new()).await.unwrap();
    assert_eq!(unknown, CommitResult::UnknownTransactionId);
}

#[tokio::test]
async fn test_map_prepare_and_commit_applies_last_write() {
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);
    put(&map, "gone", b"x").await;

    let id = TransactionId::new();
    let version: u64 = map.invoke(map::BEGIN, &id).await.unwrap();
    let log = TransactionLog::new(
        id,
        version,
        vec![
            MapUpdate::Put {
                key: "k".to_string(),
                value: b"1".to_vec(),
            },
            MapUpdate::Put {
                key: "k".to_string(),
                value: b"2".to_vec(),
            },
            MapUpdate::Remove {
                key: "gone".to_string(),
            },
        ],
    );
    let result: PrepareResult = map.invoke(map::PREPARE_AND_COMMIT, &log).await.unwrap();

    assert_eq!(result, PrepareResult::Ok);
    assert_eq!(get(&map, "k").await.unwrap().value, b"2".to_vec());
    assert_eq!(get(&map, "gone").await, None);
}

#[tokio::test]
async fn test_map_clear_keeps_prepared_keys() {
    let service = LocalService::new("map", MapService::new());
    let map = proxy(&service);
    put(&map, "locked", b"v1").await;
    put(&map, "free", b"v1").await;

    let id = TransactionId::new();
    let version: u64 = map.invoke(map::BEGIN, &id).await.unwrap();
    let log = TransactionLog::new(
        id.clone(),
        version,
        vec![MapUpdate::PutIfVersionMatch {
            key: "locked".to_string(),
            value: b"v2".to_vec(),
            version: 1,
        }],
    );
    let prepared: PrepareResult = map.invoke(map::PREPARE, &log).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);

    map.invoke_no_args::<()>(map::CLEAR).await.unwrap();
    assert_eq!(get(&map, "free").await, None);
    assert_eq!(get(&map, "locked").await.unwrap().value, b"v1".to_vec());

    let committed: CommitResult = map.invoke(map::COMMIT, &id).await.unwrap();
    assert_eq!(committed, CommitResult::Ok);
    assert_eq!(get(&map, "locked").await.unwrap().value, b"v2".to_vec());
}

// ============================================================================
// Document tree
// ============================================================================

#[tokio::test]
async fn test_tree_structural_outcomes() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);

    assert!(set_node(&tree, "root|a", b"1").await.created());
    assert_eq!(
        set_node(&tree, "root|missing|b", b"1").await.status(),
        TreeUpdateStatus::InvalidPath
    );
    assert_eq!(
        set_node(&tree, "root", b"1").await.status(),
        TreeUpdateStatus::IllegalModification
    );
    set_node(&tree, "root|a|child", b"2").await;

    let removed: RemoveOutcome<Vec<u8>> = tree
        .invoke(
            tree::REMOVE,
            &Remove {
                path: path("root|a"),
                version_match: Match::Any,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        removed,
        RemoveOutcome::Rejected(TreeUpdateStatus::IllegalModification)
    );
}

#[tokio::test]
async fn test_tree_failed_condition_is_noop_with_current_value() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    set_node(&tree, "root|a", b"1").await;

    let outcome: TreeUpdateOutcome<Vec<u8>> = tree
        .invoke(
            tree::UPDATE,
            &Update {
                path: path("root|a"),
                value: b"2".to_vec(),
                version_match: Match::Absent,
                value_match: Match::Any,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), TreeUpdateStatus::Noop);
    assert_eq!(outcome.new_value().unwrap().value, b"1".to_vec());
}

#[tokio::test]
async fn test_tree_prepared_path_is_write_locked() {
    init_tracing();
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    let version = set_node(&tree, "root|a", b"1").await.new_value().unwrap().version;

    let id = TransactionId::new();
    let begun: u64 = tree.invoke(tree::BEGIN, &id).await.unwrap();
    let log = TransactionLog::new(
        id.clone(),
        begun,
        vec![NodeUpdate::Update {
            path: path("root|a"),
            value: b"tx".to_vec(),
            version,
        }],
    );
    let prepared: PrepareResult = tree.invoke(tree::PREPARE, &log).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);

    let blocked = set_node(&tree, "root|a", b"plain").await;
    assert_eq!(blocked.status(), TreeUpdateStatus::WriteLock);
    assert!(blocked.is_retryable());
    assert!(blocked.new_value().is_none());

    let _: RollbackResult = tree.invoke(tree::ROLLBACK, &id).await.unwrap();
    assert!(set_node(&tree, "root|a", b"plain").await.updated());
}

#[tokio::test]
async fn test_tree_listener_receives_descendant_events_only() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    tree.add_event_listener(tree::CHANGE, move |events: Vec<DocumentTreeEvent>| {
        sink.lock().extend(events.into_iter().map(|e| e.path.to_string()))
    });
    set_node(&tree, "root|a", b"1").await;
    set_node(&tree, "root|b", b"1").await;
    tree.invoke::<_, ()>(tree::ADD_LISTENER, &PathArgs { path: path("root|a") })
        .await
        .unwrap();
    set_node(&tree, "root|a|x", b"1").await;
    set_node(&tree, "root|b|y", b"1").await;

    assert_eq!(*seen.lock(), vec!["root|a|x".to_string()]);
}

#[tokio::test]
async fn test_tree_transactional_delete_requires_children_in_same_log() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    let va = set_node(&tree, "root|a", b"1").await.new_value().unwrap().version;
    let vb = set_node(&tree, "root|a|b", b"1").await.new_value().unwrap().version;

    // Deleting only the parent would orphan root|a|b
    let id = TransactionId::new();
    let begun: u64 = tree.invoke(tree::BEGIN, &id).await.unwrap();
    let parent_only: TransactionLog<NodeUpdate<Vec<u8>>> = TransactionLog::new(
        id.clone(),
        begun,
        vec![NodeUpdate::Delete { path: path("root|a"), version: va }],
    );
    let prepared: PrepareResult = tree.invoke(tree::PREPARE, &parent_only).await.unwrap();
    assert_eq!(prepared, PrepareResult::OptimisticLockFailure);
    assert!(get_node(&tree, "root|a").await.is_some());
    assert!(get_node(&tree, "root|a|b").await.is_some());

    let id = TransactionId::new();
    let begun: u64 = tree.invoke(tree::BEGIN, &id).await.unwrap();
    let subtree: TransactionLog<NodeUpdate<Vec<u8>>> = TransactionLog::new(
        id.clone(),
        begun,
        vec![
            NodeUpdate::Delete { path: path("root|a|b"), version: vb },
            NodeUpdate::Delete { path: path("root|a"), version: va },
        ],
    );
    let prepared: PrepareResult = tree.invoke(tree::PREPARE, &subtree).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);
    let committed: CommitResult = tree.invoke(tree::COMMIT, &id).await.unwrap();
    assert_eq!(committed, CommitResult::Ok);
    assert!(get_node(&tree, "root|a").await.is_none());
    assert!(get_node(&tree, "root|a|b").await.is_none());
}

#[tokio::test]
async fn test_tree_create_below_prepared_node_is_write_locked() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    let version = set_node(&tree, "root|a", b"1").await.new_value().unwrap().version;

    let id = TransactionId::new();
    let begun: u64 = tree.invoke(tree::BEGIN, &id).await.unwrap();
    let log: TransactionLog<NodeUpdate<Vec<u8>>> = TransactionLog::new(
        id.clone(),
        begun,
        vec![NodeUpdate::Delete { path: path("root|a"), version }],
    );
    let prepared: PrepareResult = tree.invoke(tree::PREPARE, &log).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);

    let blocked = set_node(&tree, "root|a|c", b"child").await;
    assert_eq!(blocked.status(), TreeUpdateStatus::WriteLock);
    assert!(get_node(&tree, "root|a|c").await.is_none());

    let _: RollbackResult = tree.invoke(tree::ROLLBACK, &id).await.unwrap();
    assert!(set_node(&tree, "root|a|c", b"child").await.created());
}

#[tokio::test]
async fn test_tree_clear_keeps_prepared_paths_and_their_ancestors() {
    let service = LocalService::new("tree", DocumentTreeService::new());
    let tree = proxy(&service);
    set_node(&tree, "root|a", b"1").await;
    let version = set_node(&tree, "root|a|b", b"1").await.new_value().unwrap().version;
    set_node(&tree, "root|c", b"1").await;

    let id = TransactionId::new();
    let begun: u64 = tree.invoke(tree::BEGIN, &id).await.unwrap();
    let log = TransactionLog::new(
        id.clone(),
        begun,
        vec![NodeUpdate::Update {
            path: path("root|a|b"),
            value: b"tx".to_vec(),
            version,
        }],
    );
    let prepared: PrepareResult = tree.invoke(tree::PREPARE, &log).await.unwrap();
    assert_eq!(prepared, PrepareResult::Ok);

    tree.invoke_no_args::<()>(tree::CLEAR).await.unwrap();
    assert!(get_node(&tree, "root|c").await.is_none());
    assert!(get_node(&tree, "root|a").await.is_some());

    let committed: CommitResult = tree.invoke(tree::COMMIT, &id).await.unwrap();
    assert_eq!(committed, CommitResult::Ok);
    assert_eq!(get_node(&tree, "root|a|b").await.unwrap().value, b"tx".to_vec());
}

// ============================================================================
// Leader elector
// ============================================================================

#[tokio::test]
async fn test_leader_failover_on_session_close() {
    init_tracing();
    let service = LocalService::new("election", LeaderElectorService::new());
    let first = service.connect();
    let second = service.connect();
    let observer = proxy(&service);
    let changes = Arc::new(Mutex::new(Vec::new()));

    let sink = changes.clone();
    observer.add_event_listener(elector::CHANGE, move |events: Vec<LeadershipEvent>| {
        sink.lock().extend(events)
    });
    observer
        .invoke_no_args::<()>(elector::ADD_LISTENER)
        .await
        .unwrap();

    let run = |node: &str| TopicNodeArgs {
        topic: "mastership".to_string(),
        node_id: NodeId::new(node),
    };
    let led: Leadership = PrimitiveProxy::new(first.clone())
        .invoke(elector::RUN, &run("n1"))
        .await
        .unwrap();
    let _: Leadership = PrimitiveProxy::new(second.clone())
        .invoke(elector::RUN, &run("n2"))
        .await
        .unwrap();
    assert_eq!(led.leader.as_ref().unwrap().node_id, NodeId::new("n1"));

    first.close();

    let after: Leadership = observer
        .invoke(
            elector::GET_LEADERSHIP,
            &TopicArgs {
                topic: "mastership".to_string(),
            },
        )
        .await
        .unwrap();
    let leader = after.leader.unwrap();
    assert_eq!(leader.node_id, NodeId::new("n2"));
    assert!(leader.term > led.leader.unwrap().term);
    assert_eq!(after.candidates, vec![NodeId::new("n2")]);
    assert!(changes.lock().iter().any(|e| e.leader_changed()));

    let elected: Vec<String> = observer
        .invoke(
            elector::GET_ELECTED_TOPICS,
            &NodeArgs {
                node_id: NodeId::new("n2"),
            },
        )
        .await
        .unwrap();
    assert_eq!(elected, vec!["mastership".to_string()]);
}
