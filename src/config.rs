//! Store configuration.
//!
//! A [`CandidateConfig`] is the loosely shaped form callers deserialize or
//! build by hand. Converting it into a [`StoreConfig`] decides the topology
//! once: a `socket` selects a single node, `rootNodes` select a cluster.

use crate::validator::Validator;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

/// Where a single node listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketSpec {
    /// Host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Unix socket path. Takes precedence over host and port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl SocketSpec {
    /// A TCP socket.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: None,
        }
    }

    /// A unix domain socket.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

impl Default for SocketSpec {
    fn default() -> Self {
        Self::tcp(default_host(), default_port())
    }
}

/// A cluster node used to discover the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNode {
    /// Node URL, e.g. `redis://127.0.0.1:7000`.
    pub url: String,
}

impl RootNode {
    /// Creates a root node from its URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl From<&str> for RootNode {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// The topology a configuration connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSpec {
    /// One node.
    Single(SocketSpec),
    /// A cluster reached through its root nodes.
    Cluster(Vec<RootNode>),
}

impl ConnectionSpec {
    /// The topology this spec selects.
    pub fn topology(&self) -> crate::connection::Topology {
        match self {
            ConnectionSpec::Single(_) => crate::connection::Topology::Single,
            ConnectionSpec::Cluster(_) => crate::connection::Topology::Cluster,
        }
    }
}

/// A validated configuration for one store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Which backend topology to connect to.
    pub connection: ConnectionSpec,
    /// ACL user name.
    pub username: Option<String>,
    /// Password, passed through unchanged.
    pub password: Option<String>,
    /// Database index (single node only).
    pub db: i64,
    /// Default expiry in seconds. `Some(0)` means no expiry.
    pub ttl: Option<u64>,
    /// Replaces the default cacheable-value policy.
    pub validator: Option<Validator>,
    /// Cluster only: permit reads from replicas.
    pub use_replicas: bool,
}

impl StoreConfig {
    fn with_connection(connection: ConnectionSpec) -> Self {
        Self {
            connection,
            username: None,
            password: None,
            db: 0,
            ttl: None,
            validator: None,
            use_replicas: false,
        }
    }

    /// A single-node configuration.
    pub fn single(socket: SocketSpec) -> Self {
        Self::with_connection(ConnectionSpec::Single(socket))
    }

    /// A cluster configuration.
    pub fn cluster(root_nodes: Vec<RootNode>) -> Self {
        Self::with_connection(ConnectionSpec::Cluster(root_nodes))
    }

    /// Sets the default TTL in seconds.
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the ACL user name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the database index.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Replaces the cacheable-value policy.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Permits replica reads on a cluster.
    pub fn with_replicas(mut self, use_replicas: bool) -> Self {
        self.use_replicas = use_replicas;
        self
    }

    /// The topology this configuration selects.
    pub fn topology(&self) -> crate::connection::Topology {
        self.connection.topology()
    }
}

/// A configuration as supplied by the caller, before the topology is decided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateConfig {
    /// Selects a single node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketSpec>,
    /// Selects a cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_nodes: Option<Vec<RootNode>>,
    /// ACL user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,
    /// Default expiry in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Cluster only: permit reads from replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_replicas: Option<bool>,
    /// Replaces the default cacheable-value policy.
    #[serde(skip)]
    pub validator: Option<Validator>,
}

impl CandidateConfig {
    /// Parses one candidate from JSON.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if the text is not a valid candidate.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::invalid_configuration)
    }

    /// Attaches a cacheable-value policy.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Parses candidates from JSON: either one object or an array of them.
///
/// # Errors
/// Returns `InvalidConfiguration` if the text is neither.
pub fn candidates_from_json_str(text: &str) -> Result<Vec<CandidateConfig>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<CandidateConfig>),
        One(Box<CandidateConfig>),
    }

    let parsed: OneOrMany = serde_json::from_str(text).map_err(Error::invalid_configuration)?;
    match parsed {
        OneOrMany::Many(candidates) => Ok(candidates),
        OneOrMany::One(candidate) => Ok(vec![*candidate]),
    }
}

impl TryFrom<CandidateConfig> for StoreConfig {
    type Error = Error;

    fn try_from(candidate: CandidateConfig) -> Result<Self> {
        let connection = match (candidate.socket, candidate.root_nodes) {
            (Some(socket), None) => {
                if candidate.use_replicas == Some(true) {
                    tracing::warn!("useReplicas only applies to cluster configurations, ignoring");
                }
                ConnectionSpec::Single(socket)
            }
            (None, Some(root_nodes)) => ConnectionSpec::Cluster(root_nodes),
            (Some(_), Some(_)) => {
                return Err(Error::invalid_configuration(
                    "Both socket and rootNodes fields are present",
                ))
            }
            (None, None) => {
                return Err(Error::invalid_configuration(
                    "Missing socket or rootNodes field",
                ))
            }
        };

        let use_replicas = matches!(connection, ConnectionSpec::Cluster(_))
            && candidate.use_replicas.unwrap_or(false);

        Ok(StoreConfig {
            connection,
            username: candidate.username,
            password: candidate.password,
            db: candidate.db.unwrap_or(0),
            ttl: candidate.ttl,
            validator: candidate.validator,
            use_replicas,
        })
    }
}

impl From<StoreConfig> for CandidateConfig {
    fn from(config: StoreConfig) -> Self {
        let (socket, root_nodes) = match config.connection {
            ConnectionSpec::Single(socket) => (Some(socket), None),
            ConnectionSpec::Cluster(nodes) => (None, Some(nodes)),
        };
        CandidateConfig {
            socket,
            root_nodes,
            username: config.username,
            password: config.password,
            db: Some(config.db),
            ttl: config.ttl,
            use_replicas: Some(config.use_replicas),
            validator: config.validator,
        }
    }
}
