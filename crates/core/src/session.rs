//! Replicated session handle
//!
//! The session handle is the one collaborator every primitive depends on.
//! It is provided by the replicated-log service and is treated as opaque:
//! this crate never implements consensus, it only dispatches operations and
//! receives pushed events.
//!
//! ## Guarantees assumed from the handle
//!
//! - Invocations issued through one session are applied in FIFO order.
//! - Each invocation is applied at most once and its result delivered once.
//! - Retries, if any, happen inside the handle, never in the primitives.
//!
//! [`PrimitiveProxy`] layers the codec over the raw byte interface so that
//! primitives work with typed arguments and results.

use crate::codec;
use crate::error::Result;
use crate::operation::{EventType, OperationId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Handler for raw event payloads pushed by the session
pub type EventHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Check whether two handlers are the same registration
pub fn same_handler(a: &EventHandler, b: &EventHandler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Client-side connection to one replicated state machine
#[async_trait]
pub trait ReplicatedSession: Send + Sync {
    /// Name of the primitive this session is bound to
    fn name(&self) -> &str;

    /// Dispatch a command or query and wait for its encoded result
    async fn invoke(&self, operation: OperationId, payload: Vec<u8>) -> Result<Vec<u8>>;

    /// Register a handler for pushed events of the given type
    fn add_event_listener(&self, event: EventType, handler: EventHandler);

    /// Remove a handler previously registered with `add_event_listener`
    fn remove_event_listener(&self, event: EventType, handler: &EventHandler);
}

/// Typed view over a [`ReplicatedSession`]
///
/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct PrimitiveProxy {
    session: Arc<dyn ReplicatedSession>,
}

impl PrimitiveProxy {
    /// Wrap a session handle
    pub fn new(session: Arc<dyn ReplicatedSession>) -> Self {
        Self { session }
    }

    /// Name of the underlying primitive
    pub fn name(&self) -> &str {
        self.session.name()
    }

    /// Underlying session handle
    pub fn session(&self) -> &Arc<dyn ReplicatedSession> {
        &self.session
    }

    /// Invoke an operation with typed arguments and result
    pub async fn invoke<A, R>(&self, operation: OperationId, args: &A) -> Result<R>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let payload = codec::encode(args)?;
        let result = self.session.invoke(operation, payload).await?;
        codec::decode(&result)
    }

    /// Invoke an operation that takes no arguments
    pub async fn invoke_no_args<R>(&self, operation: OperationId) -> Result<R>
    where
        R: DeserializeOwned,
    {
        self.invoke(operation, &()).await
    }

    /// Register a typed event handler
    ///
    /// Payloads that fail to decode are logged and dropped. The returned
    /// handle is needed to remove the registration.
    pub fn add_event_listener<E, F>(&self, event: EventType, callback: F) -> EventHandler
    where
        E: DeserializeOwned,
        F: Fn(E) + Send + Sync + 'static,
    {
        let name = self.name().to_string();
        let handler: EventHandler = Arc::new(move |bytes: &[u8]| match codec::decode::<E>(bytes) {
            Ok(decoded) => callback(decoded),
            Err(e) => warn!(primitive = %name, event = %event, error = %e, "Dropping undecodable event"),
        });
        self.session.add_event_listener(event, handler.clone());
        handler
    }

    /// Remove a handler returned by `add_event_listener`
    pub fn remove_event_listener(&self, event: EventType, handler: &EventHandler) {
        self.session.remove_event_listener(event, handler);
    }
}

impl std::fmt::Debug for PrimitiveProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveProxy")
            .field("name", &self.name())
            .finish()
    }
}
