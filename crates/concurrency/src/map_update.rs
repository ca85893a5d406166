//! Single-key mutations recorded by a map transaction
//!
//! Conditional variants carry the version the transaction observed when it
//! read the key. Versions assigned by the state machine start at 1, so an
//! expected version of 0 means "the key must be absent".

use serde::{Deserialize, Serialize};

/// One key mutation of a map transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapUpdate<K, V> {
    /// Unconditionally write a value
    Put {
        /// Entry key
        key: K,
        /// New value
        value: V,
    },
    /// Unconditionally remove the key
    Remove {
        /// Entry key
        key: K,
    },
    /// Write a value if the key is still at `version`
    PutIfVersionMatch {
        /// Entry key
        key: K,
        /// New value
        value: V,
        /// Expected current version (0 = absent)
        version: u64,
    },
    /// Remove the key if it is still at `version`
    RemoveIfVersionMatch {
        /// Entry key
        key: K,
        /// Expected current version
        version: u64,
    },
    /// Write nothing; only assert the key is still at `version`
    VersionMatch {
        /// Entry key
        key: K,
        /// Expected current version (0 = absent)
        version: u64,
    },
}

impl<K, V> MapUpdate<K, V> {
    /// Key this update touches
    pub fn key(&self) -> &K {
        match self {
            MapUpdate::Put { key, .. }
            | MapUpdate::Remove { key }
            | MapUpdate::PutIfVersionMatch { key, .. }
            | MapUpdate::RemoveIfVersionMatch { key, .. }
            | MapUpdate::VersionMatch { key, .. } => key,
        }
    }

    /// Value written, `None` for removals and version checks
    pub fn value(&self) -> Option<&V> {
        match self {
            MapUpdate::Put { value, .. } | MapUpdate::PutIfVersionMatch { value, .. } => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Expected version, `None` for unconditional updates
    pub fn version(&self) -> Option<u64> {
        match self {
            MapUpdate::PutIfVersionMatch { version, .. }
            | MapUpdate::RemoveIfVersionMatch { version, .. }
            | MapUpdate::VersionMatch { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// Whether applying this update deletes the key
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            MapUpdate::Remove { .. } | MapUpdate::RemoveIfVersionMatch { .. }
        )
    }

    /// Whether applying this update changes the map
    pub fn is_write(&self) -> bool {
        !matches!(self, MapUpdate::VersionMatch { .. })
    }

    /// Convert the key and value types
    pub fn try_map<K2, V2, E>(
        self,
        key_fn: impl FnOnce(K) -> Result<K2, E>,
        value_fn: impl FnOnce(V) -> Result<V2, E>,
    ) -> Result<MapUpdate<K2, V2>, E> {
        Ok(match self {
            MapUpdate::Put { key, value } => MapUpdate::Put {
                key: key_fn(key)?,
                value: value_fn(value)?,
            },
            MapUpdate::Remove { key } => MapUpdate::Remove { key: key_fn(key)? },
            MapUpdate::PutIfVersionMatch {
                key,
                value,
                version,
            } => MapUpdate::PutIfVersionMatch {
                key: key_fn(key)?,
                value: value_fn(value)?,
                version,
            },
            MapUpdate::RemoveIfVersionMatch { key, version } => MapUpdate::RemoveIfVersionMatch {
                key: key_fn(key)?,
                version,
            },
            MapUpdate::VersionMatch { key, version } => MapUpdate::VersionMatch {
                key: key_fn(key)?,
                version,
            },
        })
    }
}
