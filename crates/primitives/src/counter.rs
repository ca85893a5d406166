//! AtomicCounter: replicated `i64` with read-modify-write operations
//!
//! Every operation is one remote invocation; the state machine applies it
//! atomically. Remote failures are returned unchanged.

use quorum_core::primitives::counter::{
    AddAndGet, CompareAndSet, GetAndAdd, Set, ADD_AND_GET, COMPARE_AND_SET, GET, GET_AND_ADD,
    GET_AND_INCREMENT, INCREMENT_AND_GET, SET,
};
use quorum_core::{PrimitiveProxy, ReplicatedSession, Result};
use std::sync::Arc;

/// Distributed atomic counter
///
/// Cheap to clone; clones share one session.
#[derive(Debug, Clone)]
pub struct AtomicCounter {
    proxy: PrimitiveProxy,
}

impl AtomicCounter {
    /// Create a counter over a session bound to a counter state machine
    pub fn new(session: Arc<dyn ReplicatedSession>) -> Self {
        Self {
            proxy: PrimitiveProxy::new(session),
        }
    }

    /// Counter name
    pub fn name(&self) -> &str {
        self.proxy.name()
    }

    /// Current value
    pub async fn get(&self) -> Result<i64> {
        self.proxy.invoke_no_args(GET).await
    }

    /// Overwrite the value
    pub async fn set(&self, value: i64) -> Result<()> {
        self.proxy.invoke(SET, &Set { value }).await
    }

    /// Store `update` if the value equals `expect`
    ///
    /// Returns whether the swap happened.
    pub async fn compare_and_set(&self, expect: i64, update: i64) -> Result<bool> {
        self.proxy
            .invoke(COMPARE_AND_SET, &CompareAndSet { expect, update })
            .await
    }

    /// Add `delta` and return the updated value
    pub async fn add_and_get(&self, delta: i64) -> Result<i64> {
        self.proxy.invoke(ADD_AND_GET, &AddAndGet { delta }).await
    }

    /// Add `delta` and return the prior value
    pub async fn get_and_add(&self, delta: i64) -> Result<i64> {
        self.proxy.invoke(GET_AND_ADD, &GetAndAdd { delta }).await
    }

    /// Add one and return the updated value
    pub async fn increment_and_get(&self) -> Result<i64> {
        self.proxy.invoke_no_args(INCREMENT_AND_GET).await
    }

    /// Add one and return the prior value
    pub async fn get_and_increment(&self) -> Result<i64> {
        self.proxy.invoke_no_args(GET_AND_INCREMENT).await
    }
}
