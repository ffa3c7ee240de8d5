//! Building stores from configurations.
//!
//! A [`Connector`] turns one [`StoreConfig`] into a live connection of the
//! topology the config names. [`RedisConnector`] talks to real Redis nodes.

use crate::config::{ConnectionSpec, StoreConfig};
use crate::connection::{ClusterConnection, Connection, SingleNodeConnection};
use crate::store::RedisStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt::Debug;

/// Establishes connections from configurations.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Performs the handshake for `config`. Does not retry.
    async fn connect(&self, config: &StoreConfig) -> Result<Connection>;
}

/// Connects to Redis nodes and clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, config: &StoreConfig) -> Result<Connection> {
        let conn: Connection = match &config.connection {
            ConnectionSpec::Single(socket) => {
                Box::new(SingleNodeConnection::connect(socket, config).await?)
            }
            ConnectionSpec::Cluster(root_nodes) => {
                Box::new(ClusterConnection::connect(root_nodes, config).await?)
            }
        };
        Ok(conn)
    }
}

/// Hands out fresh in-process connections of the configured topology.
#[cfg(feature = "memory")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryConnector;

#[cfg(feature = "memory")]
#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &StoreConfig) -> Result<Connection> {
        use crate::connection::MemoryConnection;

        let conn: Connection = match &config.connection {
            ConnectionSpec::Single(_) => Box::new(MemoryConnection::new()),
            ConnectionSpec::Cluster(_) => Box::new(MemoryConnection::cluster()),
        };
        Ok(conn)
    }
}

/// Connects with `connector` and binds a store to the new connection.
pub async fn connect_store<C>(connector: &C, config: StoreConfig) -> Result<RedisStore>
where
    C: Connector + ?Sized,
{
    let conn = connector.connect(&config).await?;
    Ok(RedisStore::new(conn, &config))
}

/// Connects to a single Redis node.
///
/// # Errors
/// Returns `InvalidConfiguration` if `config` names a cluster, and a
/// connection error if the handshake fails.
pub async fn redis_store(config: StoreConfig) -> Result<RedisStore> {
    if !matches!(config.connection, ConnectionSpec::Single(_)) {
        return Err(Error::invalid_configuration(
            "redis_store needs a socket; use redis_cluster_store for rootNodes",
        ));
    }
    connect_store(&RedisConnector, config).await
}

/// Connects to a Redis cluster.
///
/// # Errors
/// Returns `InvalidConfiguration` if `config` names a single node, and a
/// connection error if the handshake fails.
pub async fn redis_cluster_store(config: StoreConfig) -> Result<RedisStore> {
    if !matches!(config.connection, ConnectionSpec::Cluster(_)) {
        return Err(Error::invalid_configuration(
            "redis_cluster_store needs rootNodes; use redis_store for a socket",
        ));
    }
    connect_store(&RedisConnector, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RootNode, SocketSpec};
    use crate::connection::Topology;

    #[tokio::test]
    async fn test_topology_mismatch_rejected_before_connecting() {
        let cluster = StoreConfig::cluster(vec![RootNode::new("redis://127.0.0.1:7000")]);
        assert!(matches!(
            redis_store(cluster).await,
            Err(Error::InvalidConfiguration(_))
        ));

        let single = StoreConfig::single(SocketSpec::default());
        assert!(matches!(
            redis_cluster_store(single).await,
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_memory_connector_follows_topology() {
        let store = connect_store(
            &MemoryConnector,
            StoreConfig::single(SocketSpec::default()).with_ttl(5),
        )
        .await
        .unwrap();
        assert_eq!(store.get_client().topology(), Topology::Single);
        assert_eq!(store.default_ttl(), Some(5));

        let store = connect_store(&MemoryConnector, StoreConfig::cluster(Vec::new()))
            .await
            .unwrap();
        assert_eq!(store.get_client().topology(), Topology::Cluster);
    }

    #[tokio::test]
    async fn test_unreachable_node_fails() {
        // Nothing listens on port 1.
        let config = StoreConfig::single(SocketSpec::tcp("127.0.0.1", 1));
        let err = redis_store(config).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
