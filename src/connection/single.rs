//! Single-node Redis connection.
//!
//! Commands go through one multiplexed connection, so concurrent callers are
//! pipelined by the backend in arrival order. The connection's driver task is
//! owned here and aborted on disconnect, which releases the socket even while
//! replies are outstanding.

use super::{Capabilities, ConnectionEvent, Lifecycle, StoreConnection, Topology};
use crate::config::{SocketSpec, StoreConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::any::Any;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct Open {
    conn: MultiplexedConnection,
    driver: JoinHandle<()>,
}

/// A connection to one Redis instance.
pub struct SingleNodeConnection {
    client: Client,
    open: Mutex<Option<Open>>,
    lifecycle: Lifecycle,
}

impl SingleNodeConnection {
    /// Connects to the node described by `socket`.
    ///
    /// # Errors
    /// Returns a connection error if the handshake fails.
    pub async fn connect(socket: &SocketSpec, config: &StoreConfig) -> Result<Self> {
        let info = Self::connection_info_for(socket, config)?;
        let client = Client::open(info)?;
        let (conn, driver) = client.create_multiplexed_tokio_connection().await?;
        let driver = tokio::spawn(driver);

        tracing::debug!(addr = ?client.get_connection_info().addr, "connected to redis node");

        Ok(Self {
            client,
            open: Mutex::new(Some(Open { conn, driver })),
            lifecycle: Lifecycle::new(),
        })
    }

    fn connection_info_for(socket: &SocketSpec, config: &StoreConfig) -> Result<ConnectionInfo> {
        let addr = match &socket.path {
            #[cfg(unix)]
            Some(path) => ConnectionAddr::Unix(path.clone()),
            #[cfg(not(unix))]
            Some(path) => {
                return Err(Error::invalid_configuration(format!(
                    "unix socket {} is not supported on this platform",
                    path.display()
                )))
            }
            None => ConnectionAddr::Tcp(socket.host.clone(), socket.port),
        };

        Ok(ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: config.db,
                username: config.username.clone(),
                password: config.password.clone(),
            },
        })
    }

    /// The connection parameters this connection was opened with.
    pub fn connection_info(&self) -> &ConnectionInfo {
        self.client.get_connection_info()
    }

    /// A handle to the underlying multiplexed connection.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` after [`StoreConnection::disconnect`].
    pub fn multiplexed(&self) -> Result<MultiplexedConnection> {
        self.handle()
    }

    fn state(&self) -> MutexGuard<'_, Option<Open>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> Result<MultiplexedConnection> {
        self.lifecycle.ensure_open()?;
        self.state()
            .as_ref()
            .map(|open| open.conn.clone())
            .ok_or(Error::ConnectionClosed)
    }
}

impl fmt::Debug for SingleNodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleNodeConnection")
            .field("addr", &self.client.get_connection_info().addr)
            .field("db", &self.client.get_connection_info().redis.db)
            .finish()
    }
}

#[async_trait]
impl StoreConnection for SingleNodeConnection {
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

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.keys(pattern)).await
    }

    async fn flush_db(&self) -> Result<()> {
        let mut conn = self.handle()?;
        let cmd = redis::cmd("FLUSHDB");
        self.lifecycle
            .run(cmd.query_async::<_, ()>(&mut conn))
            .await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.handle()?;
        self.lifecycle.run(conn.ttl(key)).await
    }

    async fn disconnect(&self) -> Result<()> {
        let open = self.state().take().ok_or(Error::ConnectionClosed)?;
        self.lifecycle.close();
        open.driver.abort();
        tracing::debug!(addr = ?self.client.get_connection_info().addr, "redis node connection closed");
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn topology(&self) -> Topology {
        Topology::Single
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.lifecycle.subscribe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
