//! Operations, state and events of the leader elector state machine
//!
//! Candidates register for a topic; the first registered candidate becomes
//! leader. Every leadership change starts a new term.

use crate::operation::{EventType, OperationId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enter the election for a topic
pub const RUN: OperationId = OperationId::command("run");
/// Leave the election for a topic
pub const WITHDRAW: OperationId = OperationId::command("withdraw");
/// Transfer leadership to a candidate
pub const ANOINT: OperationId = OperationId::command("anoint");
/// Move a candidate to the head of the queue
pub const PROMOTE: OperationId = OperationId::command("promote");
/// Remove a node from every election
pub const EVICT: OperationId = OperationId::command("evict");
/// Read the leadership of one topic
pub const GET_LEADERSHIP: OperationId = OperationId::query("get_leadership");
/// Read the leadership of every topic
pub const GET_ALL_LEADERSHIPS: OperationId = OperationId::query("get_all_leaderships");
/// List topics led by a node
pub const GET_ELECTED_TOPICS: OperationId = OperationId::query("get_elected_topics");
/// Subscribe the session to [`CHANGE`] events
pub const ADD_LISTENER: OperationId = OperationId::command("add_listener");
/// Unsubscribe the session from [`CHANGE`] events
pub const REMOVE_LISTENER: OperationId = OperationId::command("remove_listener");

/// Batch of [`LeadershipEvent`]s pushed to subscribed sessions
pub const CHANGE: EventType = EventType::new("change");

/// Identifier of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

/// Current leader of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// Leading node
    pub node_id: NodeId,
    /// Term number, strictly increasing per topic
    pub term: u64,
    /// Wall-clock start of the term (milliseconds since epoch)
    pub term_start_time: u64,
}

/// Election state of one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leadership {
    /// Election topic
    pub topic: String,
    /// Current leader, if any
    pub leader: Option<Leader>,
    /// Registered candidates in succession order
    pub candidates: Vec<NodeId>,
}

impl Leadership {
    /// Leadership of a topic nobody has entered
    pub fn empty(topic: impl Into<String>) -> Self {
        Leadership {
            topic: topic.into(),
            leader: None,
            candidates: Vec::new(),
        }
    }

    /// Leading node, if any
    pub fn leader_node(&self) -> Option<&NodeId> {
        self.leader.as_ref().map(|l| &l.node_id)
    }
}

/// Leadership change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadershipEvent {
    /// Leadership before the change
    pub old: Leadership,
    /// Leadership after the change
    pub new: Leadership,
}

impl LeadershipEvent {
    /// Whether the leading node changed
    pub fn leader_changed(&self) -> bool {
        self.old.leader_node() != self.new.leader_node()
    }
}

/// Arguments naming a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicArgs {
    /// Election topic
    pub topic: String,
}

/// Arguments naming a topic and a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNodeArgs {
    /// Election topic
    pub topic: String,
    /// Target node
    pub node_id: NodeId,
}

/// Arguments naming a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeArgs {
    /// Target node
    pub node_id: NodeId,
}
