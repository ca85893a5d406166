//! LeaderElector: per-topic leader election among registered candidates
//!
//! A node enters a topic's election with [`LeaderElector::run`]. The first
//! candidate leads; when the leader withdraws, is evicted or its session
//! closes, the next candidate takes over with a higher term.

use crate::subscription::{SessionSubscription, SubscriptionOps};
use quorum_core::primitives::elector::{
    NodeArgs, TopicArgs, TopicNodeArgs, ADD_LISTENER, ANOINT, CHANGE, EVICT, GET_ALL_LEADERSHIPS,
    GET_ELECTED_TOPICS, GET_LEADERSHIP, PROMOTE, REMOVE_LISTENER, RUN, WITHDRAW,
};
use quorum_core::primitives::{Leadership, LeadershipEvent, NodeId};
use quorum_core::{Listener, PrimitiveProxy, ReplicatedSession, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Distributed leader elector
#[derive(Clone)]
pub struct LeaderElector {
    proxy: PrimitiveProxy,
    subscription: Arc<SessionSubscription<LeadershipEvent>>,
}

impl LeaderElector {
    /// Create an elector over a session bound to an elector state machine
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

    /// Enter the election for `topic` as `node_id`
    ///
    /// Returns the topic's leadership after registering. Running again from
    /// the same session changes nothing.
    pub async fn run(&self, topic: &str, node_id: &NodeId) -> Result<Leadership> {
        self.proxy.invoke(RUN, &topic_node(topic, node_id)).await
    }

    /// Leave the election for `topic`
    pub async fn withdraw(&self, topic: &str) -> Result<()> {
        self.proxy.invoke(WITHDRAW, &topic_args(topic)).await
    }

    /// Make `node_id` leader of `topic`; it must already be a candidate
    ///
    /// Returns whether `node_id` leads afterwards.
    pub async fn anoint(&self, topic: &str, node_id: &NodeId) -> Result<bool> {
        self.proxy.invoke(ANOINT, &topic_node(topic, node_id)).await
    }

    /// Put `node_id` first in line to succeed the current leader
    ///
    /// Returns whether `node_id` is a candidate of `topic`.
    pub async fn promote(&self, topic: &str, node_id: &NodeId) -> Result<bool> {
        self.proxy.invoke(PROMOTE, &topic_node(topic, node_id)).await
    }

    /// Remove `node_id` from every election
    pub async fn evict(&self, node_id: &NodeId) -> Result<()> {
        let args = NodeArgs {
            node_id: node_id.clone(),
        };
        self.proxy.invoke(EVICT, &args).await
    }

    /// Leadership of `topic`
    pub async fn get_leadership(&self, topic: &str) -> Result<Leadership> {
        self.proxy.invoke(GET_LEADERSHIP, &topic_args(topic)).await
    }

    /// Leadership of every topic
    pub async fn get_leaderships(&self) -> Result<BTreeMap<String, Leadership>> {
        self.proxy.invoke_no_args(GET_ALL_LEADERSHIPS).await
    }

    /// Topics `node_id` currently leads
    pub async fn get_elected_topics(&self, node_id: &NodeId) -> Result<BTreeSet<String>> {
        let args = NodeArgs {
            node_id: node_id.clone(),
        };
        self.proxy.invoke(GET_ELECTED_TOPICS, &args).await
    }

    /// Register a leadership change listener
    pub async fn add_change_listener(&self, listener: Arc<dyn Listener<LeadershipEvent>>) -> Result<()> {
        self.subscription.add(listener).await
    }

    /// Remove a leadership change listener
    pub async fn remove_change_listener(&self, listener: &Arc<dyn Listener<LeadershipEvent>>) -> Result<()> {
        self.subscription.remove(listener).await
    }
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("name", &self.proxy.name())
            .finish()
    }
}

fn topic_args(topic: &str) -> TopicArgs {
    TopicArgs {
        topic: topic.to_string(),
    }
}

fn topic_node(topic: &str, node_id: &NodeId) -> TopicNodeArgs {
    TopicNodeArgs {
        topic: topic.to_string(),
        node_id: node_id.clone(),
    }
}
