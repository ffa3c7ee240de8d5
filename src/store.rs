//! The store adapter.
//!
//! [`RedisStore`] turns generic cache calls into backend calls on one bound
//! [`StoreConnection`]. Values are validated before any network call, encoded
//! as JSON on the way in and decoded on the way out.

use crate::codec::{self, CacheValue};
use crate::config::StoreConfig;
use crate::connection::{Capability, Connection, StoreConnection};
use crate::metrics::Metrics;
use crate::validator::Validator;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Expiry in seconds for this call. Overrides the configured default,
    /// `Some(0)` means no expiry.
    pub ttl: Option<u64>,
    /// Decode stored strings on read. When `false`, reads return the raw
    /// stored text as a JSON string.
    pub parse: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            parse: true,
        }
    }
}

impl CallOptions {
    /// Options with a TTL override.
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Options returning raw stored strings.
    pub fn unparsed() -> Self {
        Self {
            parse: false,
            ..Self::default()
        }
    }

    /// Sets the TTL override.
    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets whether reads decode stored strings.
    pub fn parse(mut self, parse: bool) -> Self {
        self.parse = parse;
        self
    }
}

/// A key argument for multi-key deletes and reads. Nested lists are flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyArg {
    /// A single key.
    One(String),
    /// A list of keys or nested lists.
    Many(Vec<KeyArg>),
}

impl KeyArg {
    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            KeyArg::One(key) => out.push(key),
            KeyArg::Many(args) => {
                for arg in args {
                    arg.flatten_into(out);
                }
            }
        }
    }
}

impl From<&str> for KeyArg {
    fn from(key: &str) -> Self {
        KeyArg::One(key.to_string())
    }
}

impl From<String> for KeyArg {
    fn from(key: String) -> Self {
        KeyArg::One(key)
    }
}

impl From<&String> for KeyArg {
    fn from(key: &String) -> Self {
        KeyArg::One(key.clone())
    }
}

impl<T: Into<KeyArg>> From<Vec<T>> for KeyArg {
    fn from(keys: Vec<T>) -> Self {
        KeyArg::Many(keys.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<KeyArg> + Clone> From<&[T]> for KeyArg {
    fn from(keys: &[T]) -> Self {
        KeyArg::Many(keys.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<KeyArg>, const N: usize> From<[T; N]> for KeyArg {
    fn from(keys: [T; N]) -> Self {
        KeyArg::Many(keys.into_iter().map(Into::into).collect())
    }
}

fn flatten_keys<I>(args: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<KeyArg>,
{
    let mut keys = Vec::new();
    for arg in args {
        arg.into().flatten_into(&mut keys);
    }
    keys
}

/// A cache store bound to one backend connection.
#[derive(Debug)]
pub struct RedisStore {
    client: Connection,
    default_ttl: Option<u64>,
    validator: Validator,
    metrics: Arc<Metrics>,
}

impl RedisStore {
    /// Binds a store to an established connection.
    pub fn new(client: Connection, config: &StoreConfig) -> Self {
        Self {
            client,
            default_ttl: config.ttl,
            validator: config.validator.clone().unwrap_or_default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Binds a store with no default TTL and the default validator.
    pub fn with_defaults(client: Connection) -> Self {
        Self {
            client,
            default_ttl: None,
            validator: Validator::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// The store's name.
    pub fn name(&self) -> &'static str {
        "redis"
    }

    /// The bound cacheable-value predicate.
    pub fn is_cacheable_value(&self) -> &Validator {
        &self.validator
    }

    /// The underlying connection, for operations outside the cache contract.
    pub fn get_client(&self) -> &dyn StoreConnection {
        self.client.as_ref()
    }

    /// Counters for this store.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The configured default TTL.
    pub fn default_ttl(&self) -> Option<u64> {
        self.default_ttl
    }

    /// The expiry to send, if any. An explicit TTL wins over the default and
    /// zero means "never expires", which is sent as a plain set.
    fn resolve_ttl(&self, options: &CallOptions) -> Option<u64> {
        options.ttl.or(self.default_ttl).filter(|ttl| *ttl > 0)
    }

    fn ensure_cacheable(&self, value: &CacheValue) -> Result<()> {
        if self.validator.is_cacheable(value) {
            Ok(())
        } else {
            self.metrics.record_rejection();
            Err(Error::NotCacheableValue(value.clone()))
        }
    }

    fn read(&self, raw: String, options: &CallOptions) -> Result<Value> {
        if options.parse {
            codec::decode(&raw)
        } else {
            Ok(Value::String(raw))
        }
    }

    /// Stores a value.
    ///
    /// Returns the backend acknowledgement (`OK`).
    ///
    /// # Errors
    /// Returns `NotCacheableValue` without touching the backend if the
    /// validator refuses the value.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        options: impl Into<Option<CallOptions>>,
    ) -> Result<String> {
        let value = value.into();
        let options = options.into().unwrap_or_default();
        self.ensure_cacheable(&value)?;

        let encoded = codec::encode(&value)?;
        let ttl = self.resolve_ttl(&options);
        tracing::debug!(key, ?ttl, "set");

        let reply = match ttl {
            Some(ttl) => self.client.set_ex(key, &encoded, ttl).await?,
            None => self.client.set(key, &encoded).await?,
        };
        self.metrics.record_insertions(1);
        Ok(reply)
    }

    /// Reads a value. Returns `None` when the key is absent.
    pub async fn get(
        &self,
        key: &str,
        options: impl Into<Option<CallOptions>>,
    ) -> Result<Option<Value>> {
        let options = options.into().unwrap_or_default();

        match self.client.get(key).await? {
            Some(raw) => {
                self.metrics.record_hit();
                self.read(raw, &options).map(Some)
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    /// Reads a value and deserializes it into `T`.
    ///
    /// # Errors
    /// Returns `Codec` if the stored value does not fit `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key, None).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Deletes keys in one backend call. Absent keys are not an error.
    ///
    /// Returns how many of the keys existed.
    pub async fn del<I>(&self, keys: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<KeyArg>,
    {
        let keys = flatten_keys(keys);
        if keys.is_empty() {
            return Ok(0);
        }

        tracing::debug!(count = keys.len(), "del");
        let removed = self.client.del(&keys).await?;
        self.metrics.record_deletions(removed);
        Ok(removed)
    }

    /// Stores several pairs.
    ///
    /// Every value is validated before anything is written. With a TTL the
    /// pairs go in one `MULTI`/`EXEC` transaction, each key given that expiry,
    /// and one acknowledgement per pair is returned. Without a TTL they go in
    /// one bulk `MSET` and the single acknowledgement is returned.
    ///
    /// The transaction is all-or-nothing. The bulk set is atomic on a single
    /// node only: a cluster connection splits it per owning node, so a failure
    /// can leave some pairs written.
    ///
    /// # Errors
    /// Returns `NotCacheableValue` for the first refused value; nothing is
    /// written in that case.
    pub async fn mset<K, V>(
        &self,
        pairs: impl IntoIterator<Item = (K, V)>,
        options: impl Into<Option<CallOptions>>,
    ) -> Result<Vec<String>>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        let options = options.into().unwrap_or_default();
        let items = pairs
            .into_iter()
            .map(|(key, value)| -> Result<(String, String)> {
                let value = value.into();
                self.ensure_cacheable(&value)?;
                Ok((key.into(), codec::encode(&value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let ttl = self.resolve_ttl(&options);
        tracing::debug!(count = items.len(), ?ttl, "mset");

        let replies = match ttl {
            Some(ttl) => self.client.mset_ex(&items, ttl).await?,
            None => vec![self.client.mset(&items).await?],
        };
        self.metrics.record_insertions(items.len() as u64);
        Ok(replies)
    }

    /// Reads several keys. The result lines up with the input keys, with
    /// `None` for each absent one.
    pub async fn mget<I>(
        &self,
        keys: I,
        options: impl Into<Option<CallOptions>>,
    ) -> Result<Vec<Option<Value>>>
    where
        I: IntoIterator,
        I::Item: Into<KeyArg>,
    {
        let options = options.into().unwrap_or_default();
        let keys = flatten_keys(keys);
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        self.client
            .mget(&keys)
            .await?
            .into_iter()
            .map(|raw| match raw {
                Some(raw) => {
                    self.metrics.record_hit();
                    self.read(raw, &options).map(Some)
                }
                None => {
                    self.metrics.record_miss();
                    Ok(None)
                }
            })
            .collect()
    }

    /// Deletes keys, flattening nested lists, in one backend call.
    pub async fn mdel<I>(&self, keys: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<KeyArg>,
    {
        self.del(keys).await
    }

    /// Removes every key reachable through the connection.
    ///
    /// # Errors
    /// Returns `UnsupportedCapability` on connections without flush, such as
    /// clusters.
    pub async fn reset(&self) -> Result<()> {
        if !self.client.capabilities().flush {
            return Err(Error::UnsupportedCapability(Capability::Flush));
        }
        tracing::debug!("reset");
        self.client.flush_db().await
    }

    /// Lists keys matching a glob pattern.
    ///
    /// # Errors
    /// Returns `UnsupportedCapability` on connections without key enumeration,
    /// such as clusters.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        if !self.client.capabilities().keys {
            return Err(Error::UnsupportedCapability(Capability::Keys));
        }
        self.client.keys(pattern).await
    }

    /// Lists every key. Same as `keys("*")`.
    pub async fn all_keys(&self) -> Result<Vec<String>> {
        self.keys("*").await
    }

    /// Remaining seconds to live: `-1` without expiry, `-2` for a missing key.
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        self.client.ttl(key).await
    }
}
