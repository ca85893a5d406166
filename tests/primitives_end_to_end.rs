//! End-to-end tests through the `quorum` facade
//!
//! Each test wires several primitives to in-process services the way an
//! application would and walks a realistic scenario.

use quorum::{
    AtomicCounter, AtomicRegister, ConsistentMap, CounterService, DocumentPath, DocumentTree,
    DocumentTreeEvent, DocumentTreeEventKind, DocumentTreeService, IdGenerator, Isolation,
    LeaderElector, LeaderElectorService, LeadershipEvent, Listener, LocalService, MapService,
    NodeId, PrimitivesConfig, RegisterEvent, RemoveOutcome, TransactionCoordinator,
    TransactionId, TransactionParticipant, TransactionalMap, TreeUpdateStatus,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// ID Generation
// ============================================================================

#[tokio::test]
async fn test_ids_from_configured_generator() {
    let service = LocalService::new("ids", CounterService::with_value(40));
    let config = PrimitivesConfig::from_toml("[id_generator]\nbatch_size = 5\n").unwrap();
    let ids = IdGenerator::from_config(AtomicCounter::new(service.connect()), &config).unwrap();

    let mut drawn = Vec::new();
    for _ in 0..6 {
        drawn.push(ids.next_id().await.unwrap());
    }
    assert_eq!(drawn, vec![40, 41, 42, 43, 44, 45]);

    // A second client on its own session skips the windows already taken
    let other = IdGenerator::new(AtomicCounter::new(service.connect()), 5).unwrap();
    assert_eq!(other.next_id().await.unwrap(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_clients_draw_unique_ids() {
    let service = LocalService::new("ids", CounterService::new());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let ids = Arc::new(IdGenerator::new(AtomicCounter::new(service.connect()), 10).unwrap());
        for _ in 0..50 {
            let ids = ids.clone();
            handles.push(tokio::spawn(async move { ids.next_id().await.unwrap() }));
        }
    }
    let mut seen = HashSet::new();
    for handle in handles {
        assert!(seen.insert(handle.await.unwrap()));
    }
    assert_eq!(seen.len(), 200);
}

// ============================================================================
// Registers and Transactions
// ============================================================================

#[tokio::test]
async fn test_register_observes_transactional_commit() {
    let service = LocalService::new("config", MapService::new());
    let map = ConsistentMap::new(service.connect());
    let register: AtomicRegister<String> = AtomicRegister::new("mode", map.clone());

    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: Arc<dyn Listener<RegisterEvent<String>>> =
        Arc::new(move |e: &RegisterEvent<String>| sink.lock().unwrap().push(e.new_value.clone()));
    register.add_listener(listener).await.unwrap();

    register.set(Some("active".into())).await.unwrap();

    let id = TransactionId::new();
    let tx = Arc::new(
        TransactionalMap::<String>::begin(map.clone(), id.clone(), Isolation::RepeatableRead)
            .await
            .unwrap(),
    );
    tx.put(register.key(), &"standby".to_string()).await.unwrap();
    tx.put("unrelated", &"x".to_string()).await.unwrap();

    let participants = vec![tx as Arc<dyn TransactionParticipant>];
    let status = TransactionCoordinator::new()
        .commit(&id, &participants)
        .await
        .unwrap();
    assert!(status.is_success());

    assert_eq!(register.get().await.unwrap(), Some("standby".to_string()));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some("active".to_string()), Some("standby".to_string())]
    );
}

// ============================================================================
// Document Tree
// ============================================================================

#[tokio::test]
async fn test_document_tree_outcomes_and_watchers() {
    let service = LocalService::new("docs", DocumentTreeService::new());
    let tree: DocumentTree<String> = DocumentTree::new(service.connect());
    let root = tree.root();
    let services = root.child("services").unwrap();
    let api = services.child("api").unwrap();

    let events: Arc<Mutex<Vec<(DocumentPath, DocumentTreeEventKind)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener: Arc<dyn Listener<DocumentTreeEvent<String>>> =
        Arc::new(move |e: &DocumentTreeEvent<String>| {
            sink.lock().unwrap().push((e.path.clone(), e.kind))
        });
    tree.add_listener(&services, listener).await.unwrap();

    // Parent missing
    let outcome = tree.create(&api, &"v1".to_string()).await.unwrap();
    assert_eq!(outcome.status(), TreeUpdateStatus::InvalidPath);
    assert!(outcome.new_value().is_none());

    assert!(tree.create(&services, &String::new()).await.unwrap().created());
    let created = tree.create(&api, &"v1".to_string()).await.unwrap();
    assert!(created.created());
    let version = created.new_value().unwrap().version;

    // Creating again does not apply and reports the current value
    let again = tree.create(&api, &"v2".to_string()).await.unwrap();
    assert_eq!(again.status(), TreeUpdateStatus::Noop);
    assert_eq!(again.new_value().unwrap().value, "v1");

    let replaced = tree.replace(&api, &"v2".to_string(), version).await.unwrap();
    assert!(replaced.updated());
    assert!(!replaced.created());

    // Stale version
    let stale = tree.remove_version(&api, version).await.unwrap();
    assert_eq!(stale, RemoveOutcome::Rejected(TreeUpdateStatus::Noop));

    // A node with children cannot be removed
    let busy = tree.remove_node(&services).await.unwrap();
    assert_eq!(busy, RemoveOutcome::Rejected(TreeUpdateStatus::IllegalModification));

    assert!(tree.remove_node(&api).await.unwrap().is_removed());
    assert_eq!(tree.get(&api).await.unwrap(), None);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (services.clone(), DocumentTreeEventKind::Created),
            (api.clone(), DocumentTreeEventKind::Created),
            (api.clone(), DocumentTreeEventKind::Updated),
            (api.clone(), DocumentTreeEventKind::Deleted),
        ]
    );
}

// ============================================================================
// Leader Election
// ============================================================================

#[tokio::test]
async fn test_leadership_fails_over_when_leader_session_closes() {
    let service = LocalService::new("election", LeaderElectorService::new());
    let leader_session = service.connect();
    let first = LeaderElector::new(leader_session.clone());
    let second = LeaderElector::new(service.connect());
    let observer = LeaderElector::new(service.connect());

    let changes: Arc<Mutex<Vec<LeadershipEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    let listener: Arc<dyn Listener<LeadershipEvent>> =
        Arc::new(move |e: &LeadershipEvent| sink.lock().unwrap().push(e.clone()));
    observer.add_change_listener(listener).await.unwrap();

    let n1 = NodeId::new("n1");
    let n2 = NodeId::new("n2");
    let leadership = first.run("scheduler", &n1).await.unwrap();
    assert_eq!(leadership.leader_node(), Some(&n1));
    let leadership = second.run("scheduler", &n2).await.unwrap();
    assert_eq!(leadership.leader_node(), Some(&n1));
    assert_eq!(leadership.candidates, vec![n1.clone(), n2.clone()]);
    let first_term = leadership.leader.as_ref().map(|l| l.term).unwrap();

    leader_session.close();

    let leadership = observer.get_leadership("scheduler").await.unwrap();
    assert_eq!(leadership.leader_node(), Some(&n2));
    assert!(leadership.leader.as_ref().map(|l| l.term).unwrap() > first_term);
    assert!(observer
        .get_elected_topics(&n2)
        .await
        .unwrap()
        .contains("scheduler"));

    let changes = changes.lock().unwrap();
    assert!(changes.last().unwrap().leader_changed());
    assert_eq!(changes.last().unwrap().new.leader_node(), Some(&n2));
}
