//! An in-process connection using `dashmap`.
//!
//! Mirrors the reply conventions of a Redis node (`OK` acknowledgements,
//! `-1`/`-2` from `ttl`) so the store behaves the same against it.

use super::*;
use crate::utils::{duration_to_ttl_secs, glob_match};
use crate::{Error, Result};
use dashmap::DashMap;
use std::time::{Duration, Instant};

const OK: &str = "OK";

/// An entry in the in-process keyspace.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// An in-process connection backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryConnection {
    store: DashMap<String, Entry>,
    capabilities: Capabilities,
    topology: Topology,
    lifecycle: Lifecycle,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// Creates a connection behaving like a single node.
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
            capabilities: Capabilities::FULL,
            topology: Topology::Single,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Creates a connection behaving like a cluster: no flush, no key listing.
    pub fn cluster() -> Self {
        Self {
            capabilities: Capabilities::NONE,
            topology: Topology::Cluster,
            ..Self::new()
        }
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.store.len()
    }

    /// Returns whether no live keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries.
    fn cleanup_expired(&self) {
        let now = Instant::now();
        self.store.retain(|_, entry| !entry.is_expired(now));
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.store.get(key)?.clone();
        if entry.is_expired(now) {
            self.evict_expired(key, now);
            None
        } else {
            Some(entry)
        }
    }

    /// Drops `key` only if the entry stored now is still expired at `now`,
    /// leaving a concurrent replacement in place.
    fn evict_expired(&self, key: &str, now: Instant) {
        self.store.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn write(&self, key: &str, value: &str, ttl: Option<u64>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        self.store.insert(key.to_string(), entry);
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.lifecycle.ensure_open()?;
        Ok(self.live(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<String> {
        self.lifecycle.ensure_open()?;
        self.write(key, value, None);
        Ok(OK.to_string())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: u64) -> Result<String> {
        self.lifecycle.ensure_open()?;
        if ttl == 0 {
            return Err(Error::connection(
                "ERR invalid expire time in 'setex' command",
            ));
        }
        self.write(key, value, Some(ttl));
        Ok(OK.to_string())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.lifecycle.ensure_open()?;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.store.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn mset(&self, items: &[(String, String)]) -> Result<String> {
        self.lifecycle.ensure_open()?;
        for (key, value) in items {
            self.write(key, value, None);
        }
        Ok(OK.to_string())
    }

    async fn mset_ex(&self, items: &[(String, String)], ttl: u64) -> Result<Vec<String>> {
        self.lifecycle.ensure_open()?;
        if ttl == 0 {
            return Err(Error::connection(
                "EXECABORT Transaction discarded because of previous errors.",
            ));
        }
        Ok(items
            .iter()
            .map(|(key, value)| {
                self.write(key, value, Some(ttl));
                OK.to_string()
            })
            .collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.lifecycle.ensure_open()?;
        Ok(keys
            .iter()
            .map(|key| self.live(key).map(|entry| entry.value))
            .collect())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.lifecycle.ensure_open()?;
        if !self.capabilities.keys {
            return Err(Error::UnsupportedCapability(Capability::Keys));
        }
        self.cleanup_expired();
        Ok(self
            .store
            .iter()
            .filter(|item| glob_match(pattern, item.key()))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn flush_db(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        if !self.capabilities.flush {
            return Err(Error::UnsupportedCapability(Capability::Flush));
        }
        self.store.clear();
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        self.lifecycle.ensure_open()?;
        let ttl = match self.live(key) {
            None => -2,
            Some(Entry {
                expires_at: None, ..
            }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => duration_to_ttl_secs(at.saturating_duration_since(Instant::now())),
        };
        Ok(ttl)
    }

    async fn disconnect(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        self.lifecycle.close();
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.lifecycle.subscribe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
