#![warn(missing_docs)]
//! # redis-cache-store
//!
//! A uniform cache store over single-node and clustered Redis connections.
//!
//! ```no_run
//! use redis_cache_store::{redis_store, CallOptions, SocketSpec, StoreConfig};
//! use serde_json::json;
//!
//! # async fn example() -> redis_cache_store::Result<()> {
//! let store = redis_store(StoreConfig::single(SocketSpec::tcp("127.0.0.1", 6379)).with_ttl(60)).await?;
//!
//! store.set("foo", "bar", None).await?;
//! assert_eq!(store.get("foo", None).await?, Some(json!("bar")));
//!
//! // Zero means "never expires".
//! store.set("forever", json!({"a": 1}), CallOptions::with_ttl(0)).await?;
//! assert_eq!(store.ttl("forever").await?, -1);
//! # Ok(())
//! # }
//! ```
//!
//! When several deployments may be available, hand them all to the adaptive
//! selector and the first one that connects wins:
//!
//! ```no_run
//! use redis_cache_store::{candidates_from_json_str, redis_adaptive_connection};
//!
//! # async fn example() -> redis_cache_store::Result<()> {
//! let candidates = candidates_from_json_str(r#"[
//!     {"rootNodes": [{"url": "redis://10.0.0.1:7000"}], "useReplicas": true},
//!     {"socket": {"host": "127.0.0.1", "port": 6379}, "ttl": 5}
//! ]"#)?;
//! let store = redis_adaptive_connection(candidates).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod selector;
pub mod store;
#[cfg(feature = "memory")]
mod utils;
pub mod validator;

pub use codec::CacheValue;
pub use config::{
    candidates_from_json_str, CandidateConfig, ConnectionSpec, RootNode, SocketSpec, StoreConfig,
};
pub use connection::{
    Capabilities, Capability, ConnectionEvent, StoreConnection, Topology,
};
pub use error::{Error, Result};
pub use factory::{connect_store, redis_cluster_store, redis_store, Connector, RedisConnector};
#[cfg(feature = "memory")]
pub use factory::MemoryConnector;
pub use selector::{redis_adaptive_connection, AdaptiveSelector, SelectionEvent};
pub use store::{CallOptions, KeyArg, RedisStore};
pub use validator::{Truthy, Validator};

/// Common prelude for using the library.
pub mod prelude {
    pub use crate::{
        codec::CacheValue,
        config::{CandidateConfig, StoreConfig},
        connection::StoreConnection,
        error::Error,
        selector::AdaptiveSelector,
        store::{CallOptions, RedisStore},
        validator::Validator,
        Result,
    };
}
