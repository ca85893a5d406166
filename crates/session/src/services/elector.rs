//! Leader elector state machine
//!
//! Each topic keeps its candidates in registration order. The first
//! candidate of an empty topic becomes leader with a fresh term. When the
//! leader leaves (withdraw, eviction or session close) the next candidate
//! takes over with the topic's next term. Terms never repeat within a topic.

use crate::state_machine::{reply, Commit, ServiceContext, SessionId, StateMachine};
use quorum_core::primitives::elector::{
    NodeArgs, TopicArgs, TopicNodeArgs, ADD_LISTENER, ANOINT, CHANGE, EVICT, GET_ALL_LEADERSHIPS,
    GET_ELECTED_TOPICS, GET_LEADERSHIP, PROMOTE, REMOVE_LISTENER, RUN, WITHDRAW,
};
use quorum_core::primitives::{Leader, Leadership, LeadershipEvent, NodeId};
use quorum_core::{Error, Result, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    node_id: NodeId,
    session: SessionId,
}

#[derive(Debug, Default)]
struct Election {
    registrations: Vec<Registration>,
    leader: Option<Registration>,
    term: u64,
    term_start_time: u64,
    last_term: u64,
}

impl Election {
    fn elect(&mut self, registration: Option<Registration>, now: Timestamp) {
        match registration {
            Some(registration) => {
                self.last_term += 1;
                self.term = self.last_term;
                self.term_start_time = now.as_millis();
                self.leader = Some(registration);
            }
            None => self.leader = None,
        }
    }

    /// Drop registrations matching `gone`, re-electing if the leader went
    fn drop_where(&mut self, gone: impl Fn(&Registration) -> bool, now: Timestamp) {
        self.registrations.retain(|r| !gone(r));
        if self.leader.as_ref().map_or(false, &gone) {
            let next = self.registrations.first().cloned();
            self.elect(next, now);
        }
    }

    fn leadership(&self, topic: &str) -> Leadership {
        Leadership {
            topic: topic.to_string(),
            leader: self.leader.as_ref().map(|r| Leader {
                node_id: r.node_id.clone(),
                term: self.term,
                term_start_time: self.term_start_time,
            }),
            candidates: self.registrations.iter().map(|r| r.node_id.clone()).collect(),
        }
    }
}

/// Topic-scoped leader elections
#[derive(Debug, Default)]
pub struct LeaderElectorService {
    elections: BTreeMap<String, Election>,
    listeners: BTreeSet<SessionId>,
    // Commit time of the last applied operation
    clock: Timestamp,
}

impl LeaderElectorService {
    /// Elector with no topics
    pub fn new() -> Self {
        Self::default()
    }

    fn leadership(&self, topic: &str) -> Leadership {
        self.elections
            .get(topic)
            .map(|e| e.leadership(topic))
            .unwrap_or_else(|| Leadership::empty(topic))
    }

    /// Apply a change to one topic, collecting the event if it changed anything
    fn change(
        &mut self,
        topic: &str,
        changes: &mut Vec<LeadershipEvent>,
        f: impl FnOnce(&mut Election),
    ) -> Leadership {
        let old = self.leadership(topic);
        f(self.elections.entry(topic.to_string()).or_default());
        let new = self.leadership(topic);
        if old != new {
            changes.push(LeadershipEvent {
                old,
                new: new.clone(),
            });
        }
        new
    }

    fn run(&mut self, commit: &Commit<'_>, args: TopicNodeArgs, changes: &mut Vec<LeadershipEvent>) -> Leadership {
        let registration = Registration {
            node_id: args.node_id,
            session: commit.session(),
        };
        let now = commit.time();
        self.change(&args.topic, changes, |election| {
            if election.registrations.iter().any(|r| r.session == registration.session) {
                return;
            }
            election.registrations.push(registration.clone());
            if election.leader.is_none() {
                election.elect(Some(registration), now);
            }
        })
    }

    fn anoint(&mut self, args: TopicNodeArgs, changes: &mut Vec<LeadershipEvent>) -> bool {
        if !self.elections.contains_key(&args.topic) {
            return false;
        }
        let now = self.clock;
        let leadership = self.change(&args.topic, changes, |election| {
            let already_leader = election.leader.as_ref().map(|r| &r.node_id) == Some(&args.node_id);
            if already_leader {
                return;
            }
            let candidate = election
                .registrations
                .iter()
                .find(|r| r.node_id == args.node_id)
                .cloned();
            if candidate.is_some() {
                election.elect(candidate, now);
            }
        });
        leadership.leader_node() == Some(&args.node_id)
    }

    fn promote(&mut self, args: TopicNodeArgs, changes: &mut Vec<LeadershipEvent>) -> bool {
        let is_candidate = self
            .elections
            .get(&args.topic)
            .map_or(false, |e| e.registrations.iter().any(|r| r.node_id == args.node_id));
        if !is_candidate {
            return false;
        }
        self.change(&args.topic, changes, |election| {
            if let Some(position) = election
                .registrations
                .iter()
                .position(|r| r.node_id == args.node_id)
            {
                let registration = election.registrations.remove(position);
                election.registrations.insert(0, registration);
            }
        });
        true
    }

    fn drop_everywhere(
        &mut self,
        changes: &mut Vec<LeadershipEvent>,
        gone: impl Fn(&Registration) -> bool + Copy,
    ) {
        let now = self.clock;
        let topics: Vec<String> = self.elections.keys().cloned().collect();
        for topic in topics {
            self.change(&topic, changes, |election| election.drop_where(gone, now));
        }
    }

    fn notify(&self, ctx: &mut ServiceContext, changes: &[LeadershipEvent]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        for session in &self.listeners {
            ctx.publish(*session, CHANGE, changes)?;
        }
        Ok(())
    }
}

impl StateMachine for LeaderElectorService {
    fn apply(&mut self, commit: &Commit<'_>, ctx: &mut ServiceContext) -> Result<Vec<u8>> {
        self.clock = commit.time();
        let mut changes = Vec::new();
        let result = match commit.operation() {
            RUN => {
                let args: TopicNodeArgs = commit.args()?;
                reply(&self.run(commit, args, &mut changes))
            }
            WITHDRAW => {
                let TopicArgs { topic } = commit.args()?;
                if self.elections.contains_key(&topic) {
                    let session = commit.session();
                    self.change(&topic, &mut changes, |election| {
                        election.drop_where(|r| r.session == session, commit.time())
                    });
                }
                reply(&())
            }
            ANOINT => {
                let args: TopicNodeArgs = commit.args()?;
                reply(&self.anoint(args, &mut changes))
            }
            PROMOTE => {
                let args: TopicNodeArgs = commit.args()?;
                reply(&self.promote(args, &mut changes))
            }
            EVICT => {
                let NodeArgs { node_id } = commit.args()?;
                self.drop_everywhere(&mut changes, |r| r.node_id == node_id);
                reply(&())
            }
            GET_LEADERSHIP => {
                let TopicArgs { topic } = commit.args()?;
                reply(&self.leadership(&topic))
            }
            GET_ALL_LEADERSHIPS => {
                let all: BTreeMap<&String, Leadership> = self
                    .elections
                    .iter()
                    .map(|(topic, election)| (topic, election.leadership(topic)))
                    .collect();
                reply(&all)
            }
            GET_ELECTED_TOPICS => {
                let NodeArgs { node_id } = commit.args()?;
                let topics: BTreeSet<&String> = self
                    .elections
                    .iter()
                    .filter(|(_, e)| e.leader.as_ref().map(|r| &r.node_id) == Some(&node_id))
                    .map(|(topic, _)| topic)
                    .collect();
                reply(&topics)
            }
            ADD_LISTENER => {
                self.listeners.insert(commit.session());
                reply(&())
            }
            REMOVE_LISTENER => {
                self.listeners.remove(&commit.session());
                reply(&())
            }
            other => Err(Error::UnknownOperation(other.id().to_string())),
        }?;
        self.notify(ctx, &changes)?;
        Ok(result)
    }

    fn on_session_close(&mut self, session: SessionId, ctx: &mut ServiceContext) {
        self.listeners.remove(&session);
        let mut changes = Vec::new();
        self.drop_everywhere(&mut changes, |r| r.session == session);
        if let Err(e) = self.notify(ctx, &changes) {
            tracing::warn!(target: "quorum::session", session, error = %e, "Failed to publish leadership changes");
        }
    }
}
