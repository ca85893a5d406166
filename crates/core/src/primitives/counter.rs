//! Operations of the atomic counter state machine
//!
//! The counter is a single `i64` starting at 0. Every read-modify-write is
//! applied atomically by the state machine.

use crate::operation::OperationId;
use serde::{Deserialize, Serialize};

/// Read the current value
pub const GET: OperationId = OperationId::query("get");
/// Overwrite the value
pub const SET: OperationId = OperationId::command("set");
/// Replace the value if it equals an expected value
pub const COMPARE_AND_SET: OperationId = OperationId::command("compare_and_set");
/// Add a delta and return the updated value
pub const ADD_AND_GET: OperationId = OperationId::command("add_and_get");
/// Add a delta and return the prior value
pub const GET_AND_ADD: OperationId = OperationId::command("get_and_add");
/// Add one and return the updated value
pub const INCREMENT_AND_GET: OperationId = OperationId::command("increment_and_get");
/// Add one and return the prior value
pub const GET_AND_INCREMENT: OperationId = OperationId::command("get_and_increment");

/// Arguments of [`SET`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    /// New value
    pub value: i64,
}

/// Arguments of [`COMPARE_AND_SET`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareAndSet {
    /// Expected current value
    pub expect: i64,
    /// Value to store if the expectation holds
    pub update: i64,
}

/// Arguments of [`ADD_AND_GET`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAndGet {
    /// Amount to add
    pub delta: i64,
}

/// Arguments of [`GET_AND_ADD`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAndAdd {
    /// Amount to add
    pub delta: i64,
}
