//! One session subscription fanned out to many application listeners
//!
//! Primitives whose state machine pushes batches of events to subscribed
//! sessions keep a single session-level registration: the remote
//! `ADD_LISTENER` command and the session event handler are installed when
//! the first listener arrives and torn down when the last one leaves.
//! Membership changes and install/teardown happen under one async mutex,
//! so the empty/non-empty transitions cannot interleave.

use quorum_core::{EventHandler, EventType, Listener, ListenerRegistry, OperationId, PrimitiveProxy, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Remote operations and event stream backing a subscription
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubscriptionOps {
    pub(crate) event: EventType,
    pub(crate) add: OperationId,
    pub(crate) remove: OperationId,
}

pub(crate) struct SessionSubscription<E> {
    proxy: PrimitiveProxy,
    ops: SubscriptionOps,
    listeners: Arc<ListenerRegistry<E>>,
    handler: Mutex<Option<EventHandler>>,
}

impl<E> SessionSubscription<E>
where
    E: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(proxy: PrimitiveProxy, ops: SubscriptionOps) -> Self {
        Self {
            proxy,
            ops,
            listeners: Arc::new(ListenerRegistry::new()),
            handler: Mutex::new(None),
        }
    }

    /// Add a listener, subscribing the session if it is the first
    pub(crate) async fn add(&self, listener: Arc<dyn Listener<E>>) -> Result<()> {
        let mut handler = self.handler.lock().await;
        if handler.is_none() {
            let listeners = self.listeners.clone();
            let installed = self
                .proxy
                .add_event_listener(self.ops.event, move |events: Vec<E>| {
                    for event in &events {
                        listeners.notify(event);
                    }
                });
            if let Err(e) = self.proxy.invoke_no_args::<()>(self.ops.add).await {
                self.proxy.remove_event_listener(self.ops.event, &installed);
                return Err(e);
            }
            debug!(target: "quorum::primitives", primitive = %self.proxy.name(), event = %self.ops.event, "Session subscribed");
            *handler = Some(installed);
        }
        self.listeners.add(listener);
        Ok(())
    }

    /// Remove a listener, unsubscribing the session if it was the last
    pub(crate) async fn remove(&self, listener: &Arc<dyn Listener<E>>) -> Result<()> {
        let mut handler = self.handler.lock().await;
        if !self.listeners.remove(listener) || !self.listeners.is_empty() {
            return Ok(());
        }
        if let Some(installed) = handler.take() {
            self.proxy.remove_event_listener(self.ops.event, &installed);
            debug!(target: "quorum::primitives", primitive = %self.proxy.name(), event = %self.ops.event, "Session unsubscribed");
            self.proxy.invoke_no_args::<()>(self.ops.remove).await?;
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}
