//! Atomic counter state machine

use crate::state_machine::{reply, Commit, ServiceContext, StateMachine};
use quorum_core::primitives::counter::{
    AddAndGet, CompareAndSet, GetAndAdd, Set, ADD_AND_GET, COMPARE_AND_SET, GET,
    GET_AND_ADD, GET_AND_INCREMENT, INCREMENT_AND_GET, SET,
};
use quorum_core::{Error, Result};

/// Single `i64` starting at 0
#[derive(Debug, Default)]
pub struct CounterService {
    value: i64,
}

impl CounterService {
    /// Counter starting at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter starting at `value`
    pub fn with_value(value: i64) -> Self {
        CounterService { value }
    }

    fn add(&mut self, delta: i64) -> i64 {
        let prior = self.value;
        self.value = self.value.wrapping_add(delta);
        prior
    }
}

impl StateMachine for CounterService {
    fn apply(&mut self, commit: &Commit<'_>, _ctx: &mut ServiceContext) -> Result<Vec<u8>> {
        match commit.operation() {
            GET => reply(&self.value),
            SET => {
                let Set { value } = commit.args()?;
                self.value = value;
                reply(&())
            }
            COMPARE_AND_SET => {
                let CompareAndSet { expect, update } = commit.args()?;
                let swapped = self.value == expect;
                if swapped {
                    self.value = update;
                }
                reply(&swapped)
            }
            ADD_AND_GET => {
                let AddAndGet { delta } = commit.args()?;
                self.add(delta);
                reply(&self.value)
            }
            GET_AND_ADD => {
                let GetAndAdd { delta } = commit.args()?;
                reply(&self.add(delta))
            }
            INCREMENT_AND_GET => {
                self.add(1);
                reply(&self.value)
            }
            GET_AND_INCREMENT => reply(&self.add(1)),
            other => Err(Error::UnknownOperation(other.id().to_string())),
        }
    }
}
