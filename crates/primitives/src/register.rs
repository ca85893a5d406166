//! AtomicRegister: a single value stored under one key of a ConsistentMap
//!
//! ## Storage
//!
//! The register's value is encoded with the codec and stored as raw bytes
//! under a fixed map key. An absent key is an empty register (`None`).
//!
//! ## Events
//!
//! Register listeners are not map listeners. The first register listener
//! installs exactly one physical listener on the backing map; that listener
//! drops events for other keys, decodes the rest and republishes them as
//! [`RegisterEvent`]s to every register listener. Removing the last
//! register listener removes the physical one. Listener membership and
//! install/teardown share one async mutex, so "first added" and "last
//! removed" are unambiguous even under concurrent callers.

use crate::config::PrimitivesConfig;
use crate::map::{ConsistentMap, Entry};
use quorum_core::primitives::MapEvent;
use quorum_core::{codec, Listener, ListenerRegistry, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Change of a register's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEvent<V> {
    /// Register name
    pub name: String,
    /// Value after the change
    pub new_value: Option<V>,
    /// Value before the change
    pub old_value: Option<V>,
}

struct FanOut<V> {
    listeners: Arc<ListenerRegistry<RegisterEvent<V>>>,
    physical: Option<Arc<dyn Listener<MapEvent>>>,
}

/// Distributed register holding an optional `V`
pub struct AtomicRegister<V> {
    name: String,
    key: String,
    map: ConsistentMap,
    fan_out: Mutex<FanOut<V>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> AtomicRegister<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Register stored under the key `name`
    pub fn new(name: impl Into<String>, map: ConsistentMap) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::with_key(name, key, map)
    }

    /// Register stored under an explicit key
    pub fn with_key(name: impl Into<String>, key: impl Into<String>, map: ConsistentMap) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            map,
            fan_out: Mutex::new(FanOut {
                listeners: Arc::new(ListenerRegistry::new()),
                physical: None,
            }),
            _value: PhantomData,
        }
    }

    /// Register whose key follows `[register] key`
    pub fn from_config(name: impl Into<String>, map: ConsistentMap, config: &PrimitivesConfig) -> Self {
        let name = name.into();
        let key = config.register_key(&name).to_string();
        Self::with_key(name, key, map)
    }

    /// Register name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map key holding the value
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value
    pub async fn get(&self) -> Result<Option<V>> {
        decode_entry(self.map.get(&self.key).await?)
    }

    /// Replace the value, returning the previous one
    ///
    /// `None` empties the register.
    pub async fn get_and_set(&self, value: Option<V>) -> Result<Option<V>> {
        let prior = match value {
            Some(value) => self.map.put(&self.key, codec::encode(&value)?).await?,
            None => self.map.remove(&self.key).await?,
        };
        decode_entry(prior)
    }

    /// Replace the value
    pub async fn set(&self, value: Option<V>) -> Result<()> {
        match value {
            Some(value) => {
                self.map.put(&self.key, codec::encode(&value)?).await?;
            }
            None => {
                self.map.remove(&self.key).await?;
            }
        }
        Ok(())
    }

    /// Store `update` if the current value equals `expect`
    ///
    /// `None` on either side means "empty register".
    pub async fn compare_and_set(&self, expect: Option<&V>, update: Option<&V>) -> Result<bool> {
        match (expect, update) {
            (None, None) => Ok(true),
            (None, Some(update)) => Ok(self
                .map
                .put_if_absent(&self.key, codec::encode(update)?)
                .await?
                .is_none()),
            (Some(expect), None) => self.map.remove_value(&self.key, &codec::encode(expect)?).await,
            (Some(expect), Some(update)) => {
                self.map
                    .replace_value(&self.key, &codec::encode(expect)?, codec::encode(update)?)
                    .await
            }
        }
    }

    /// Register a change listener
    pub async fn add_listener(&self, listener: Arc<dyn Listener<RegisterEvent<V>>>) -> Result<()> {
        let mut fan_out = self.fan_out.lock().await;
        if fan_out.physical.is_none() {
            let physical = self.physical_listener(fan_out.listeners.clone());
            self.map.add_listener(physical.clone()).await?;
            debug!(target: "quorum::primitives", register = %self.name, key = %self.key, "Installed physical map listener");
            fan_out.physical = Some(physical);
        }
        fan_out.listeners.add(listener);
        Ok(())
    }

    /// Remove a change listener
    pub async fn remove_listener(&self, listener: &Arc<dyn Listener<RegisterEvent<V>>>) -> Result<()> {
        let mut fan_out = self.fan_out.lock().await;
        if !fan_out.listeners.remove(listener) || !fan_out.listeners.is_empty() {
            return Ok(());
        }
        if let Some(physical) = fan_out.physical.take() {
            debug!(target: "quorum::primitives", register = %self.name, key = %self.key, "Removing physical map listener");
            self.map.remove_listener(&physical).await?;
        }
        Ok(())
    }

    /// Number of register listeners
    pub async fn listener_count(&self) -> usize {
        self.fan_out.lock().await.listeners.len()
    }

    /// Number of listeners this register's map has
    ///
    /// At most one of them belongs to this register however many register
    /// listeners there are.
    pub fn physical_subscriptions(&self) -> usize {
        self.map.listener_count()
    }

    fn physical_listener(
        &self,
        listeners: Arc<ListenerRegistry<RegisterEvent<V>>>,
    ) -> Arc<dyn Listener<MapEvent>> {
        let name = self.name.clone();
        let key = self.key.clone();
        Arc::new(move |event: &MapEvent| {
            if event.key != key {
                return;
            }
            let decoded: Result<(Option<V>, Option<V>)> = decode_entry(event.new_value.clone())
                .and_then(|new_value| Ok((new_value, decode_entry(event.old_value.clone())?)));
            match decoded {
                Ok((new_value, old_value)) => listeners.notify(&RegisterEvent {
                    name: name.clone(),
                    new_value,
                    old_value,
                }),
                Err(e) => warn!(target: "quorum::primitives", register = %name, error = %e, "Dropping undecodable register event"),
            }
        })
    }
}

impl<V> std::fmt::Debug for AtomicRegister<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicRegister")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

fn decode_entry<V: DeserializeOwned>(entry: Option<Entry>) -> Result<Option<V>> {
    entry.map(|e| codec::decode(&e.value)).transpose()
}
