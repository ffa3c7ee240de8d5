//! Store behaviour against in-process connections.
//!
//! These exercise the full cache contract without a Redis server.

#![cfg(feature = "memory")]

use redis_cache_store::connection::MemoryConnection;
use redis_cache_store::{
    connect_store, CacheValue, CallOptions, Capability, ConnectionEvent, Error, KeyArg,
    MemoryConnector, RedisStore, RootNode, SocketSpec, StoreConfig, Validator,
};
use serde_json::{json, Value};

fn config() -> StoreConfig {
    StoreConfig::single(SocketSpec::tcp("127.0.0.1", 6380)).with_ttl(5)
}

async fn store() -> RedisStore {
    connect_store(&MemoryConnector, config()).await.unwrap()
}

/// Allows `Undefined`, refuses "FooBarString", otherwise the default policy.
fn custom_validator() -> Validator {
    Validator::custom(|value: &CacheValue| match value {
        CacheValue::Undefined => true,
        CacheValue::Json(Value::String(s)) if s == "FooBarString" => false,
        other => Validator::is_defined(other),
    })
}

async fn custom_store() -> RedisStore {
    connect_store(&MemoryConnector, config().with_validator(custom_validator()))
        .await
        .unwrap()
}

mod set {
    use super::*;

    #[tokio::test]
    async fn stores_with_default_ttl() {
        let store = store().await;

        assert_eq!(store.set("foo", "bar", None).await.unwrap(), "OK");
        assert_eq!(store.get("foo", None).await.unwrap(), Some(json!("bar")));
        assert_eq!(store.ttl("foo").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn stores_with_specific_ttl() {
        let store = store().await;

        store.set("foo", "bar", CallOptions::with_ttl(5)).await.unwrap();
        assert_eq!(store.ttl("foo").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn stores_with_infinite_ttl() {
        let store = store().await;

        store.set("foo", "bar", CallOptions::with_ttl(0)).await.unwrap();
        assert_eq!(store.ttl("foo").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn without_any_ttl_never_expires() {
        let store = RedisStore::with_defaults(Box::new(MemoryConnection::new()));

        store.set("foo", "bar", None).await.unwrap();
        assert_eq!(store.ttl("foo").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn rejects_null() {
        let store = store().await;

        let err = store.set("foo", json!(null), None).await.unwrap_err();
        assert_eq!(err.to_string(), "\"null\" is not a cacheable value");
        assert_eq!(store.get("foo", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_undefined() {
        let store = store().await;

        let err = store.set("foo1", CacheValue::Undefined, None).await.unwrap_err();
        assert_eq!(err, Error::NotCacheableValue(CacheValue::Undefined));
        assert_eq!(store.get("foo1", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stores_undefined_when_permitted() {
        let store = custom_store().await;

        assert!(store.is_cacheable_value().is_cacheable(&CacheValue::Undefined));
        store.set("foo3", CacheValue::Undefined, None).await.unwrap();
        assert_eq!(store.get("foo3", None).await.unwrap(), Some(json!("undefined")));
    }

    #[tokio::test]
    async fn refuses_value_disallowed_by_custom_validator() {
        let store = custom_store().await;

        assert!(!store
            .is_cacheable_value()
            .is_cacheable(&CacheValue::from("FooBarString")));
        let err = store.set("foobar", "FooBarString", None).await.unwrap_err();
        assert_eq!(err.to_string(), "\"FooBarString\" is not a cacheable value");
    }

    #[tokio::test]
    async fn fails_once_client_is_closed() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(
            store.set("foo", "bar", None).await,
            Err(Error::ConnectionClosed)
        );
    }
}

mod get {
    use super::*;

    #[tokio::test]
    async fn retrieves_structured_values() {
        let store = store().await;
        let value = json!({"id": 7, "tags": ["a", "b"], "nested": {"ok": true}});

        store.set("doc", value.clone(), None).await.unwrap();
        assert_eq!(store.get("doc", CallOptions::default()).await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn retrieves_unparsed() {
        let store = store().await;

        store.set("foo", "bar", None).await.unwrap();
        assert_eq!(
            store.get("foo", CallOptions::unparsed()).await.unwrap(),
            Some(json!("\"bar\""))
        );
    }

    #[tokio::test]
    async fn returns_none_for_missing_key() {
        let store = store().await;
        assert_eq!(store.get("invalidKey", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        let err = store.get("foo", None).await.unwrap_err();
        assert_eq!(err.to_string(), "The client is closed");
    }
}

mod del {
    use super::*;

    #[tokio::test]
    async fn deletes_a_key() {
        let store = store().await;

        store.set("foo", "bar", None).await.unwrap();
        assert_eq!(store.del(["foo"]).await.unwrap(), 1);
        assert_eq!(store.get("foo", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn absent_key_is_not_an_error() {
        let store = store().await;

        store.set("other", "value", None).await.unwrap();
        assert_eq!(store.del(["missing"]).await.unwrap(), 0);
        assert_eq!(store.get("missing", None).await.unwrap(), None);
        assert_eq!(store.get("other", None).await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.del(["foo"]).await, Err(Error::ConnectionClosed));
    }
}

mod mset {
    use super::*;

    #[tokio::test]
    async fn uses_transaction_with_default_ttl() {
        let store = store().await;

        let replies = store
            .mset(vec![("foo", "bar"), ("foo2", "bar2")], None)
            .await
            .unwrap();
        assert_eq!(replies, vec!["OK", "OK"]);
        assert_eq!(
            store.mget(["foo", "foo2"], None).await.unwrap(),
            vec![Some(json!("bar")), Some(json!("bar2"))]
        );
        assert_eq!(store.ttl("foo2").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn applies_specific_ttl_to_every_key() {
        let store = store().await;

        store
            .mset(vec![("foo", "bar"), ("foo2", "bar2")], CallOptions::with_ttl(60))
            .await
            .unwrap();
        assert_eq!(store.ttl("foo").await.unwrap(), 60);
        assert_eq!(store.ttl("foo2").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn infinite_ttl_uses_bulk_set() {
        let store = store().await;

        let replies = store
            .mset(vec![("foo", "bar")], CallOptions::with_ttl(0))
            .await
            .unwrap();
        assert_eq!(replies, vec!["OK"]);
        assert_eq!(store.ttl("foo").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn rejects_null() {
        let store = store().await;

        let err = store
            .mset(vec![("foo2", CacheValue::Json(Value::Null))], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "\"null\" is not a cacheable value");
    }

    #[tokio::test]
    async fn stores_undefined_when_permitted() {
        let store = custom_store().await;

        store
            .mset(
                vec![("foo3", CacheValue::Undefined), ("foo4", CacheValue::Undefined)],
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            store.mget(["foo3", "foo4"], None).await.unwrap(),
            vec![Some(json!("undefined")), Some(json!("undefined"))]
        );
    }

    #[tokio::test]
    async fn refuses_value_disallowed_by_custom_validator() {
        let store = custom_store().await;

        let err = store
            .mset(vec![("ok", "fine"), ("foobar", "FooBarString")], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "\"FooBarString\" is not a cacheable value");
        assert_eq!(store.get("ok", None).await.unwrap(), None);
    }
}

mod mget {
    use super::*;

    #[tokio::test]
    async fn retrieves_unparsed() {
        let store = store().await;

        store.mset(vec![("foo", "bar")], None).await.unwrap();
        assert_eq!(
            store.mget(["foo"], CallOptions::unparsed()).await.unwrap(),
            vec![Some(json!("\"bar\""))]
        );
    }

    #[tokio::test]
    async fn missing_keys_keep_their_position() {
        let store = store().await;

        assert_eq!(
            store.mget(["invalidKey", "otherInvalidKey"], None).await.unwrap(),
            vec![None, None]
        );

        store.set("middle", 2, None).await.unwrap();
        assert_eq!(
            store.mget(["first", "middle", "last"], None).await.unwrap(),
            vec![None, Some(json!(2)), None]
        );
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.mget(["foo"], None).await, Err(Error::ConnectionClosed));
    }
}

mod mdel {
    use super::*;

    async fn seeded() -> RedisStore {
        let store = store().await;
        store
            .mset(vec![("foo", "bar"), ("foo2", "bar2")], None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn deletes_listed_keys() {
        let store = seeded().await;

        store.mdel(["foo", "foo2"]).await.unwrap();
        assert_eq!(store.mget(["foo", "foo2"], None).await.unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn flattens_nested_lists() {
        let store = seeded().await;
        store.set("foo3", "bar3", None).await.unwrap();

        let removed = store
            .mdel(vec![KeyArg::from(vec!["foo", "foo2"]), KeyArg::from("foo3")])
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(
            store.mget(["foo", "foo2", "foo3"], None).await.unwrap(),
            vec![None, None, None]
        );
    }

    #[tokio::test]
    async fn absent_keys_are_not_an_error() {
        let store = seeded().await;

        assert_eq!(store.mdel(["nope", "neither"]).await.unwrap(), 0);
        assert_eq!(store.get("foo", None).await.unwrap(), Some(json!("bar")));
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.mdel(["foo"]).await, Err(Error::ConnectionClosed));
    }
}

mod reset {
    use super::*;

    #[tokio::test]
    async fn flushes_underlying_db() {
        let store = store().await;

        store.set("foo", "bar", None).await.unwrap();
        store.set("baz", "qux", None).await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.mget(["foo", "baz"], None).await.unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn unsupported_on_cluster() {
        let config = StoreConfig::cluster(vec![RootNode::new("redis://127.0.0.1:6379")]);
        let store = connect_store(&MemoryConnector, config).await.unwrap();

        assert_eq!(
            store.reset().await,
            Err(Error::UnsupportedCapability(Capability::Flush))
        );
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.reset().await, Err(Error::ConnectionClosed));
    }
}

mod keys {
    use super::*;

    #[tokio::test]
    async fn matches_pattern() {
        let store = store().await;

        store.set("foo", "bar", None).await.unwrap();
        assert!(store.keys("foo").await.unwrap().contains(&"foo".to_string()));
    }

    #[tokio::test]
    async fn lists_everything_by_default() {
        let store = store().await;

        store
            .mset(vec![("foo", "bar"), ("foo2", "bar2"), ("foo3", "bar3")], None)
            .await
            .unwrap();

        let mut keys = store.all_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["foo", "foo2", "foo3"]);
    }

    #[tokio::test]
    async fn unsupported_on_cluster() {
        let config = StoreConfig::cluster(vec![RootNode::new("redis://127.0.0.1:6379")]);
        let store = connect_store(&MemoryConnector, config).await.unwrap();

        store.set("foo", "bar", None).await.unwrap();
        assert_eq!(
            store.keys("*").await,
            Err(Error::UnsupportedCapability(Capability::Keys))
        );
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.keys("foo").await, Err(Error::ConnectionClosed));
    }
}

mod ttl {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_minus_two() {
        let store = store().await;
        assert_eq!(store.ttl("invalidKey").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn reports_closed_client() {
        let store = store().await;

        store.set("foo", "bar", None).await.unwrap();
        store.get_client().disconnect().await.unwrap();
        assert_eq!(store.ttl("foo").await, Err(Error::ConnectionClosed));
    }
}

mod is_cacheable_value {
    use super::*;

    #[tokio::test]
    async fn default_accepts_defined_values() {
        let store = store().await;
        let validator = store.is_cacheable_value();

        assert!(validator.is_cacheable(&CacheValue::from(0)));
        assert!(validator.is_cacheable(&CacheValue::from(100)));
        assert!(validator.is_cacheable(&CacheValue::from("")));
        assert!(validator.is_cacheable(&CacheValue::from("test")));
        assert!(!validator.is_cacheable(&CacheValue::Undefined));
        assert!(!validator.is_cacheable(&CacheValue::Json(Value::Null)));
    }

    #[tokio::test]
    async fn override_replaces_builtin_policy() {
        let config = config().with_validator(Validator::custom(|_: &CacheValue| "I was overridden"));
        let store = connect_store(&MemoryConnector, config).await.unwrap();

        assert!(store.is_cacheable_value().is_cacheable(&CacheValue::from(0)));
        store.set("anything", json!(null), None).await.unwrap();
        assert_eq!(store.get("anything", None).await.unwrap(), Some(Value::Null));
    }
}

mod client {
    use super::*;

    #[tokio::test]
    async fn exposes_concrete_connection() {
        let store = store().await;

        assert_eq!(store.name(), "redis");
        let memory = store
            .get_client()
            .as_any()
            .downcast_ref::<MemoryConnection>()
            .expect("memory connection");
        store.set("foo", "bar", None).await.unwrap();
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn publishes_close_event() {
        let store = store().await;
        let mut events = store.get_client().events();

        store.get_client().disconnect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed);
    }
}
