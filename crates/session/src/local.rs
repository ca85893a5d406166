//! In-process replicated session
//!
//! `LocalService` hosts one [`StateMachine`] and hands out [`LocalSession`]s
//! that implement [`ReplicatedSession`]. It provides the guarantees the
//! primitives rely on without any consensus:
//!
//! - commits are applied one at a time under a single lock, in the order
//!   their invocations reach it
//! - every invocation suspends once before it is applied, so concurrent
//!   callers genuinely interleave
//! - events published while applying a commit are delivered after the
//!   lock is released and before the invocation completes
//!
//! Tests can inject remote failures with [`LocalService::fail_next`] and
//! count remote calls with [`LocalService::invocations`].

use crate::state_machine::{Commit, Publication, ServiceContext, SessionId, StateMachine};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use quorum_core::{
    same_handler, Error, EventHandler, EventType, OperationId, ReplicatedSession, Result, Timestamp,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type Handlers = Mutex<Vec<(EventType, EventHandler)>>;

struct Machine {
    state: Box<dyn StateMachine>,
    index: u64,
    time: Timestamp,
}

struct ServiceInner {
    name: String,
    machine: Mutex<Machine>,
    sessions: RwLock<HashMap<SessionId, Arc<Handlers>>>,
    next_session: AtomicU64,
    pending_failures: AtomicUsize,
    invocations: Mutex<HashMap<&'static str, u64>>,
}

impl ServiceInner {
    fn apply(&self, session: SessionId, operation: OperationId, payload: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = ServiceContext::new();
        let result = {
            let mut machine = self.machine.lock();
            if operation.is_command() {
                machine.index += 1;
                machine.time = machine.time.max(Timestamp::now());
            }
            let commit = Commit::new(machine.index, machine.time, session, operation, payload);
            machine.state.apply(&commit, &mut ctx)
        };
        self.deliver(ctx.into_outbox());
        result
    }

    fn close_session(&self, session: SessionId) {
        let mut ctx = ServiceContext::new();
        self.machine.lock().state.on_session_close(session, &mut ctx);
        self.sessions.write().remove(&session);
        self.deliver(ctx.into_outbox());
    }

    fn deliver(&self, outbox: Vec<Publication>) {
        for publication in outbox {
            let handlers = match self.sessions.read().get(&publication.session) {
                Some(handlers) => handlers.clone(),
                None => continue,
            };
            let snapshot: Vec<EventHandler> = handlers
                .lock()
                .iter()
                .filter(|(event, _)| *event == publication.event)
                .map(|(_, handler)| handler.clone())
                .collect();
            for handler in snapshot {
                handler(&publication.payload);
            }
        }
    }
}

/// Host of one replicated state machine
#[derive(Clone)]
pub struct LocalService {
    inner: Arc<ServiceInner>,
}

impl LocalService {
    /// Host a state machine under a primitive name
    pub fn new(name: impl Into<String>, state: impl StateMachine) -> Self {
        LocalService {
            inner: Arc::new(ServiceInner {
                name: name.into(),
                machine: Mutex::new(Machine {
                    state: Box::new(state),
                    index: 0,
                    time: Timestamp::EPOCH,
                }),
                sessions: RwLock::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                pending_failures: AtomicUsize::new(0),
                invocations: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Name of the hosted primitive
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a new session
    pub fn connect(&self) -> Arc<LocalSession> {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let handlers = Arc::new(Mutex::new(Vec::new()));
        self.inner.sessions.write().insert(id, handlers.clone());
        debug!(target: "quorum::session", primitive = %self.inner.name, session = id, "Session opened");
        Arc::new(LocalSession {
            id,
            inner: self.inner.clone(),
            handlers,
            closed: AtomicBool::new(false),
        })
    }

    /// Fail the next `count` invocations with a remote failure
    pub fn fail_next(&self, count: usize) {
        self.inner.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Number of times an operation was invoked, failed attempts included
    pub fn invocations(&self, operation: OperationId) -> u64 {
        self.inner
            .invocations
            .lock()
            .get(operation.id())
            .copied()
            .unwrap_or(0)
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }
}

impl std::fmt::Debug for LocalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalService")
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Client session of a [`LocalService`]
pub struct LocalSession {
    id: SessionId,
    inner: Arc<ServiceInner>,
    handlers: Arc<Handlers>,
    closed: AtomicBool,
}

impl LocalSession {
    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Close the session
    ///
    /// The state machine releases everything the session held; later
    /// invocations fail with `Error::SessionClosed`. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "quorum::session", primitive = %self.inner.name, session = self.id, "Session closed");
        self.inner.close_session(self.id);
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ReplicatedSession for LocalSession {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn invoke(&self, operation: OperationId, payload: Vec<u8>) -> Result<Vec<u8>> {
        tokio::task::yield_now().await;

        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        *self
            .inner
            .invocations
            .lock()
            .entry(operation.id())
            .or_insert(0) += 1;

        if self.take_injected_failure() {
            warn!(target: "quorum::session", primitive = %self.inner.name, %operation, "Injected remote failure");
            return Err(Error::remote(operation.id(), "injected failure"));
        }

        self.inner.apply(self.id, operation, &payload)
    }

    fn add_event_listener(&self, event: EventType, handler: EventHandler) {
        self.handlers.lock().push((event, handler));
    }

    fn remove_event_listener(&self, event: EventType, handler: &EventHandler) {
        self.handlers
            .lock()
            .retain(|(e, h)| !(*e == event && same_handler(h, handler)));
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSession")
            .field("primitive", &self.inner.name)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
