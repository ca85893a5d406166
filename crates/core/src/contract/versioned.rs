//! Generic versioned wrapper type
//!
//! Every read of replicated state returns data wrapped in `Versioned<T>`.
//! The version is a logical timestamp assigned by the replicated state
//! machine; it increases monotonically across all writes of one primitive.
//!
//! ## The Contract
//!
//! ```text
//! fn get(&self, key) -> Result<Option<Versioned<T>>>
//! ```
//!
//! Two reads of the same key with equal versions hold equal values, and
//! compare equal: equality looks at the value and version only.

use super::Timestamp;
use serde::{Deserialize, Serialize};

/// A value with its version information
///
/// ## Fields
///
/// - `value`: The actual data
/// - `version`: Logical timestamp assigned by the state machine
/// - `creation_time`: Wall-clock time the version was created
///
/// ## Invariants
///
/// - `version` always matches the mutation that created this data
/// - Value is never modified after creation (immutable versions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The actual value
    pub value: T,

    /// Logical version
    pub version: u64,

    /// Creation time of this version
    pub creation_time: Timestamp,
}

impl<T> Versioned<T> {
    /// Create a new versioned value with current timestamp
    ///
    /// State machines stamp values with their commit time through
    /// [`Versioned::with_timestamp`] instead.
    pub fn new(value: T, version: u64) -> Self {
        Versioned {
            value,
            version,
            creation_time: Timestamp::now(),
        }
    }

    /// Create a versioned value with explicit timestamp
    pub fn with_timestamp(value: T, version: u64, creation_time: Timestamp) -> Self {
        Versioned {
            value,
            version,
            creation_time,
        }
    }

    /// Map the inner value to a new type
    pub fn map<U, F>(self, f: F) -> Versioned<U>
    where
        F: FnOnce(T) -> U,
    {
        Versioned {
            value: f(self.value),
            version: self.version,
            creation_time: self.creation_time,
        }
    }

    /// Map the inner value through a fallible conversion
    pub fn try_map<U, E, F>(self, f: F) -> Result<Versioned<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(Versioned {
            value: f(self.value)?,
            version: self.version,
            creation_time: self.creation_time,
        })
    }

    /// Get a reference to the inner value
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume and return the inner value
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get the version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get the creation time
    #[inline]
    pub fn creation_time(&self) -> Timestamp {
        self.creation_time
    }
}

impl<T: PartialEq> PartialEq for Versioned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.value == other.value
    }
}

impl<T: Eq> Eq for Versioned<T> {}

impl<T> AsRef<T> for Versioned<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Extract the value from an optional versioned value
pub fn value_or_none<T>(versioned: Option<Versioned<T>>) -> Option<T> {
    versioned.map(Versioned::into_value)
}
