//! Connections to the key-value backend.
//!
//! A [`StoreConnection`] is the narrow operation set the store adapter needs.
//! Single-node and cluster Redis connections implement it, as does an
//! in-process [`memory::MemoryConnection`] used for tests and embedding.

use async_trait::async_trait;
use std::any::Any;
use std::fmt::{self, Debug};
use std::future::Future;
use tokio::sync::{broadcast, watch};

pub mod cluster;
#[cfg(feature = "memory")]
pub mod memory;
pub mod single;

pub use cluster::ClusterConnection;
#[cfg(feature = "memory")]
pub use memory::MemoryConnection;
pub use single::SingleNodeConnection;

/// Whether the connection talks to one node or to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// One backend instance.
    Single,
    /// A distributed backend topology.
    Cluster,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Single => f.write_str("master/slave"),
            Topology::Cluster => f.write_str("cluster"),
        }
    }
}

/// A whole-keyspace operation a connection may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Flushing every key (`reset`).
    Flush,
    /// Enumerating keys by pattern (`keys`).
    Keys,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Flush => f.write_str("flushing the keyspace"),
            Capability::Keys => f.write_str("key enumeration"),
        }
    }
}

/// The whole-keyspace operations a connection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `flush_db` is available.
    pub flush: bool,
    /// `keys` is available.
    pub keys: bool,
}

impl Capabilities {
    /// Everything a single node offers.
    pub const FULL: Capabilities = Capabilities {
        flush: true,
        keys: true,
    };

    /// What a cluster connection offers.
    pub const NONE: Capabilities = Capabilities {
        flush: false,
        keys: false,
    };

    /// Whether `capability` is available.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Flush => self.flush,
            Capability::Keys => self.keys,
        }
    }
}

/// Notifications published by a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The backend reported a fatal network or protocol error.
    Error(String),
    /// The connection was closed.
    Closed,
}

/// Trait defining the backend operations used by the store adapter.
///
/// Keys and values are plain strings; encoding happens in the store.
#[async_trait]
pub trait StoreConnection: Send + Sync + Debug {
    /// Gets the stored string for a key.
    async fn get(&self, key: &str) -> crate::Result<Option<String>>;

    /// Stores a string without expiry. Returns the backend acknowledgement.
    async fn set(&self, key: &str, value: &str) -> crate::Result<String>;

    /// Stores a string expiring after `ttl` seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl: u64) -> crate::Result<String>;

    /// Deletes keys in one call. Returns how many existed.
    async fn del(&self, keys: &[String]) -> crate::Result<u64>;

    /// Bulk-sets pairs in one call.
    async fn mset(&self, items: &[(String, String)]) -> crate::Result<String>;

    /// Sets every pair with the same expiry inside one transaction.
    ///
    /// Returns one acknowledgement per pair.
    async fn mset_ex(&self, items: &[(String, String)], ttl: u64) -> crate::Result<Vec<String>>;

    /// Gets several keys in one call, in input order.
    async fn mget(&self, keys: &[String]) -> crate::Result<Vec<Option<String>>>;

    /// Lists keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> crate::Result<Vec<String>>;

    /// Removes every key.
    async fn flush_db(&self) -> crate::Result<()>;

    /// Remaining seconds to live: `-1` without expiry, `-2` when missing.
    async fn ttl(&self, key: &str) -> crate::Result<i64>;

    /// Closes the connection. Later operations fail with `ConnectionClosed`.
    async fn disconnect(&self) -> crate::Result<()>;

    /// The whole-keyspace operations this connection offers.
    fn capabilities(&self) -> Capabilities;

    /// The topology behind this connection.
    fn topology(&self) -> Topology;

    /// Subscribes to connection events.
    fn events(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Access to the concrete type for out-of-band operations.
    fn as_any(&self) -> &dyn Any;
}

/// A boxed connection that can be used as a trait object.
pub type Connection = Box<dyn StoreConnection>;

const EVENT_CAPACITY: usize = 16;

/// Closed signal and event broadcaster shared by the connection implementations.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    closed: watch::Sender<bool>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (closed, _) = watch::channel(false);
        Self { closed, events }
    }

    /// Fails with `ConnectionClosed` once `close` has run.
    pub(crate) fn ensure_open(&self) -> crate::Result<()> {
        if *self.closed.borrow() {
            Err(crate::Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Marks the connection closed. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        let was_open = !self.closed.send_replace(true);
        if was_open {
            // No subscribers is fine.
            let _ = self.events.send(ConnectionEvent::Closed);
        }
        was_open
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Resolves once the connection is closed.
    fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move {
            loop {
                let is_closed = *closed.borrow_and_update();
                if is_closed || closed.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    /// Runs a backend command.
    ///
    /// A command still in flight when the connection is closed is abandoned
    /// and fails with `ConnectionClosed`.
    pub(crate) async fn run<T, F>(&self, command: F) -> crate::Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let closed = self.closed();
        tokio::select! {
            biased;
            _ = closed => Err(crate::Error::ConnectionClosed),
            result = command => result.map_err(|e| self.observe(e)),
        }
    }

    /// Publishes fatal backend errors and passes every error through.
    pub(crate) fn observe(&self, error: redis::RedisError) -> crate::Error {
        if error.is_connection_dropped() || error.is_io_error() || error.is_connection_refusal() {
            tracing::warn!(error = %error, "backend connection error");
            let _ = self.events.send(ConnectionEvent::Error(error.to_string()));
        }
        crate::Error::from(error)
    }
}
