//! Contract types shared by every primitive
//!
//! - `versioned`: value plus logical version (every read returns one)
//! - `timestamp`: wall-clock creation time attached to a version

pub mod timestamp;
pub mod versioned;

pub use timestamp::Timestamp;
pub use versioned::{value_or_none, Versioned};
