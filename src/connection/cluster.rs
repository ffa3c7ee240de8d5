//! Clustered Redis connection.
//!
//! Keys are routed to the node owning their slot. Whole-keyspace operations
//! (`FLUSHDB`, `KEYS`) are not offered since no single node sees every key.
//! `MGET`, `MSET` and `DEL` over keys in several slots are split per node by
//! the client, so a bulk set is only atomic within one node. The `MULTI`/`EXEC`
//! batch used for expiring writes is sent to a single node and needs its keys
//! to share a slot.

use super::{Capabilities, Capability, ConnectionEvent, Lifecycle, StoreConnection, Topology};
use crate::config::{RootNode, StoreConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use redis::cluster::{ClusterClient, ClusterClientBuilder};
use redis::cluster_async::ClusterConnection as RedisClusterConnection;
use redis::AsyncCommands;
use std::any::Any;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// A connection to a Redis cluster.
pub struct ClusterConnection {
    conn: Mutex<Option<RedisClusterConnection>>,
    root_nodes: Vec<String>,
    read_from_replicas: bool,
    lifecycle: Lifecycle,
}

impl ClusterConnection {
    /// Connects to the cluster reachable through `root_nodes`.
    ///
    /// # Errors
    /// Returns a connection error if no root node answers, and
    /// `InvalidConfiguration` if the list is empty.
    pub async fn connect(root_nodes: &[RootNode], config: &StoreConfig) -> Result<Self> {
        let client = Self::client_for(root_nodes, config)?;
        let conn = client.get_async_connection().await?;

        let root_nodes: Vec<String> = root_nodes.iter().map(|node| node.url.clone()).collect();
        tracing::debug!(?root_nodes, "connected to redis cluster");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            root_nodes,
            read_from_replicas: config.use_replicas,
            lifecycle: Lifecycle::new(),
        })
    }

    fn client_for(root_nodes: &[RootNode], config: &StoreConfig) -> Result<ClusterClient> {
        if root_nodes.is_empty() {
            return Err(Error::invalid_configuration("rootNodes must not be empty"));
        }
        if config.db != 0 {
            tracing::warn!(db = config.db, "cluster mode only serves db 0, ignoring db");
        }

        let urls: Vec<&str> = root_nodes.iter().map(|node| node.url.as_str()).collect();
        let mut builder = ClusterClientBuilder::new(urls);
        if let Some(username) = &config.username {
            builder = builder.username(username.clone());
        }
        if let Some(password) = &config.password {
            builder = builder.password(password.clone());
        }
        if config.use_replicas {
            builder = builder.read_from_replicas();
        }
        Ok(builder.build()?)
    }

    /// The root node URLs the cluster was discovered from.
    pub fn root_nodes(&self) -> &[String] {
        &self.root_nodes
    }

    /// Whether reads may be served by replicas.
    pub fn reads_from_replicas(&self) -> bool {
        self.read_from_replicas
    }

    /// A handle to the underlying cluster connection.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` after [`StoreConnection::disconnect`].
    pub fn cluster(&self) -> Result<RedisClusterConnection> {
        self.handle()
    }

    fn state(&self) -> MutexGuard<'_, Option<RedisClusterConnection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> Result<RedisClusterConnection> {
        self.lifecycle.ensure_open()?;
        self.state().clone().ok_or(Error::ConnectionClosed)
    }
}

impl fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("root_nodes", &self.root_nodes)
            .field("read_from_replicas", &self.read_from_replicas)
            .finish()
    }
}

#[async_trait]
impl StoreConnection for ClusterConnection {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<String> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.set(key, value)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: u64) -> Result<String> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.set_ex(key, value, ttl as usize)).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.del(keys)).await
    }

    async fn mset(&self, items: &[(String, String)]) -> Result<String> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.mset(items)).await
    }

    async fn mset_ex(&self, items: &[(String, String)], ttl: u64) -> Result<Vec<String>> {
        let mut conn = self.handle()?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in items {
            pipe.set_ex(key, value, ttl as usize);
        }
        self.lifecycle.run(pipe.query_async(&mut conn)).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut conn = self.handle()?;
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.lifecycle.run(cmd.query_async(&mut conn)).await
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        self.lifecycle.ensure_open()?;
        Err(Error::UnsupportedCapability(Capability::Keys))
    }

    async fn flush_db(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        Err(Error::UnsupportedCapability(Capability::Flush))
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.ttl(key)).await
    }

    async fn disconnect(&self) -> Result<()> {
        let conn = self.state().take().ok_or(Error::ConnectionClosed)?;
        self.lifecycle.close();
        drop(conn);
        tracing::debug!(root_nodes = ?self.root_nodes, "redis cluster connection closed");
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn topology(&self) -> Topology {
        Topology::Cluster
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.lifecycle.subscribe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_root_nodes_rejected() {
        let config = StoreConfig::cluster(Vec::new());
        assert!(matches!(
            ClusterConnection::client_for(&[], &config),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_client_builds_from_root_nodes() {
        let nodes = vec![RootNode::new("redis://127.0.0.1:7000")];
        let config = StoreConfig::cluster(nodes.clone()).with_replicas(true);
        assert!(ClusterConnection::client_for(&nodes, &config).is_ok());
    }

    // Requires a cluster with a node at localhost:7000
    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_cluster_lacks_keyspace_operations() -> Result<()> {
        let nodes = vec![RootNode::new("redis://127.0.0.1:7000")];
        let config = StoreConfig::cluster(nodes.clone());
        let conn = ClusterConnection::connect(&nodes, &config).await?;

        conn.set("foo", "\"bar\"").await?;
        assert_eq!(conn.get("foo").await?, Some("\"bar\"".to_string()));
        assert_eq!(
            conn.keys("*").await,
            Err(Error::UnsupportedCapability(Capability::Keys))
        );
        assert_eq!(
            conn.flush_db().await,
            Err(Error::UnsupportedCapability(Capability::Flush))
        );

        Ok(())
    }
}
