//! Error types for quorum primitives
//!
//! This module defines the error type shared by every primitive client.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - **Remote failures** (`Remote`, `SessionClosed`, `UnknownOperation`): the
//!   replicated session could not produce a result. Propagated unchanged to
//!   the caller, never retried inside this layer.
//! - **Programming invariants** (`InvalidArgument`, `Config`): raised at
//!   construction time, before any remote call is made.
//! - **Codec failures** (`Serialization`).
//! - **Map write locks** (`ConcurrentModification`): a plain map write hit a
//!   key held by a prepared transaction.
//!
//! Structural tree outcomes (invalid path, illegal modification, write lock)
//! are not errors: they are returned as ordinary values.
//!
//! `Error` is `Clone` so a single failure can be observed by every caller
//! composed on a shared future.

use thiserror::Error;

/// Result type alias for quorum operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for quorum primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The session handle failed to execute an operation
    #[error("Remote failure in '{operation}': {message}")]
    Remote {
        /// Operation that was being executed
        operation: String,
        /// Failure reported by the session
        message: String,
    },

    /// The session handle has been closed
    #[error("Session closed")]
    SessionClosed,

    /// The remote state machine has no handler for the operation
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A construction-time invariant was violated
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A write targeted a key locked by a prepared transaction
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a remote failure for an operation
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Whether this error originated from the session handle
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Remote { .. } | Error::SessionClosed | Error::UnknownOperation(_)
        )
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_remote() {
        let err = Error::remote("get_and_add", "leader unavailable");
        let msg = err.to_string();
        assert!(msg.contains("Remote failure"));
        assert!(msg.contains("get_and_add"));
        assert!(msg.contains("leader unavailable"));
    }

    #[test]
    fn test_error_display_invalid_argument() {
        let err = Error::invalid_argument("batch size must be at least 1");
        assert!(err.to_string().contains("batch size must be at least 1"));
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::remote("get", "boom").is_remote());
        assert!(Error::SessionClosed.is_remote());
        assert!(Error::UnknownOperation("x".into()).is_remote());
        assert!(!Error::Serialization("bad".into()).is_remote());
        assert!(!Error::invalid_argument("bad").is_remote());
    }

    #[test]
    fn test_error_from_decode() {
        let invalid = vec![0xc1u8];
        let result: Result<String> = rmp_serde::from_slice(&invalid).map_err(Error::from);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_error_is_cloneable() {
        let err = Error::remote("get", "boom");
        assert_eq!(err.clone(), err);
    }
}
