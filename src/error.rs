//! Error types for the redis-cache-store library.

use crate::codec::CacheValue;
use crate::connection::Capability;
use std::fmt;

/// The main error type for the redis-cache-store library.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum Error {
    /// The active validator refused the value. Raised before any network call.
    #[error("\"{0}\" is not a cacheable value")]
    NotCacheableValue(CacheValue),

    /// A configuration names neither a single-node socket nor cluster root nodes
    /// (or names both).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Every candidate configuration handed to the adaptive selector failed.
    #[error("None of the {attempted} configurations lead to a proper connection")]
    ExhaustedCandidates {
        /// Number of candidates that were tried.
        attempted: usize,
    },

    /// The bound connection does not expose the requested operation.
    #[error("Connection does not support {0}")]
    UnsupportedCapability(Capability),

    /// The backend returned an error. The message is the backend's own.
    #[error("{0}")]
    Connection(String),

    /// The connection was closed through [`StoreConnection::disconnect`].
    ///
    /// [`StoreConnection::disconnect`]: crate::connection::StoreConnection::disconnect
    #[error("The client is closed")]
    ConnectionClosed,

    /// A stored string could not be decoded.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl Error {
    /// Creates a new connection error.
    pub fn connection<E: fmt::Display>(error: E) -> Self {
        Self::Connection(error.to_string())
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_configuration<E: fmt::Display>(error: E) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }

    /// Whether the error came from the backend rather than from local checks.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed)
    }
}

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<redis::RedisError> for Error {
    fn from(error: redis::RedisError) -> Self {
        Error::Connection(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Codec(error.to_string())
    }
}
