//! Post-commit view of a pending map transaction
//!
//! `TransactionalMapUpdate` answers "what will key K hold once this batch
//! commits?" without rescanning the batch on every query.
//!
//! ## Indexing rules
//!
//! - The index is built once, lazily, on the first query. Concurrent first
//!   queries block on a single initialisation.
//! - Updates are scanned in batch order, so the last update touching a key
//!   wins.
//! - Removals are indexed as tombstones, so "deleted by this batch" stays
//!   distinguishable from "not mentioned by this batch".
//! - `VersionMatch` records write nothing and never touch the index.
//!
//! The batch itself is immutable after construction; the index is the only
//! interior state and is a pure function of the batch.

use crate::map_update::MapUpdate;
use crate::transaction::{TransactionId, TransactionLog};
use once_cell::sync::OnceCell;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Effect of a pending batch on one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingValue<V> {
    /// The batch leaves this value in place
    Written(V),
    /// The batch removes the key
    Deleted,
    /// The batch does not write the key; committed state applies
    Untouched,
}

impl<V> PendingValue<V> {
    /// The written value, `None` for deletions and untouched keys
    pub fn written(self) -> Option<V> {
        match self {
            PendingValue::Written(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the batch writes or deletes the key
    pub fn is_touched(&self) -> bool {
        !matches!(self, PendingValue::Untouched)
    }
}

/// Ordered batch of map updates for one transaction
#[derive(Debug)]
pub struct TransactionalMapUpdate<K, V> {
    transaction_id: TransactionId,
    batch: Vec<MapUpdate<K, V>>,
    /// key -> position of the last writing update, `None` for a tombstone
    index: OnceCell<HashMap<K, Option<usize>>>,
}

impl<K, V> TransactionalMapUpdate<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Wrap a batch of updates
    pub fn new(transaction_id: TransactionId, batch: Vec<MapUpdate<K, V>>) -> Self {
        Self {
            transaction_id,
            batch,
            index: OnceCell::new(),
        }
    }

    /// Owning transaction
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Updates in batch order
    pub fn batch(&self) -> &[MapUpdate<K, V>] {
        &self.batch
    }

    /// Value `key` will hold after commit
    ///
    /// Returns `None` both when the batch deletes the key and when it never
    /// writes it; use [`pending`](Self::pending) to tell the two apart.
    pub fn value_for_key<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pending(key).written()
    }

    /// Effect of the batch on `key`
    pub fn pending<Q>(&self, key: &Q) -> PendingValue<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index().get(key) {
            Some(Some(position)) => match self.batch[*position].value() {
                Some(value) => PendingValue::Written(value),
                None => PendingValue::Deleted,
            },
            Some(None) => PendingValue::Deleted,
            None => PendingValue::Untouched,
        }
    }

    /// Keys written or deleted by the batch
    pub fn touched_keys(&self) -> impl Iterator<Item = &K> {
        self.index().keys()
    }

    /// Whether the index has been built
    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    fn index(&self) -> &HashMap<K, Option<usize>> {
        self.index.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.batch.len());
            for (position, update) in self.batch.iter().enumerate() {
                if !update.is_write() {
                    continue;
                }
                let entry = if update.value().is_some() {
                    Some(position)
                } else {
                    None
                };
                index.insert(update.key().clone(), entry);
            }
            index
        })
    }
}

impl<K, V> From<TransactionLog<MapUpdate<K, V>>> for TransactionalMapUpdate<K, V>
where
    K: Eq + Hash + Clone,
{
    fn from(log: TransactionLog<MapUpdate<K, V>>) -> Self {
        let transaction_id = log.transaction_id().clone();
        TransactionalMapUpdate::new(transaction_id, log.into_records())
    }
}
