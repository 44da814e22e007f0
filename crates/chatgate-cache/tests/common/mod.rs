use std::time::Duration;

use chatgate_cache::{CacheManager, Lookup};

/// Checks the facade contract. Holds identically for every backend.
pub async fn assert_cache_contract(cache: &CacheManager) {
    let ttl = Duration::from_secs(60);

    // set then get
    assert!(cache.set("x", &"v1", ttl, Some("contract-ns1")).await);
    assert!(cache.set("x", &"v2", ttl, Some("contract-ns2")).await);
    assert_eq!(
        cache.get::<String>("x", Some("contract-ns1")).await.as_deref(),
        Some("v1")
    );
    assert_eq!(
        cache.get::<String>("x", Some("contract-ns2")).await.as_deref(),
        Some("v2")
    );

    // exists / delete
    assert!(cache.exists("x", Some("contract-ns1")).await);
    assert!(cache.delete("x", Some("contract-ns1")).await);
    assert!(!cache.exists("x", Some("contract-ns1")).await);
    assert_eq!(
        cache.lookup::<String>("x", Some("contract-ns1")).await,
        Lookup::Missing
    );

    // increment
    assert_eq!(cache.increment("counter", Some("contract-ns1")).await, Some(1));
    assert_eq!(cache.increment("counter", Some("contract-ns1")).await, Some(2));
    assert_eq!(cache.get::<i64>("counter", Some("contract-ns1")).await, Some(2));

    // expiry
    assert!(
        cache
            .set("short", &42, Duration::from_secs(1), Some("contract-ns1"))
            .await
    );
    assert_eq!(cache.get::<i32>("short", Some("contract-ns1")).await, Some(42));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(cache.get::<i32>("short", Some("contract-ns1")).await, None);
    assert!(!cache.exists("short", Some("contract-ns1")).await);

    // bulk clear
    assert!(cache.clear_namespace(Some("contract-ns1")).await.is_some());
    assert!(cache.clear_namespace(Some("contract-ns2")).await.is_some());
    assert_eq!(cache.get::<String>("x", Some("contract-ns2")).await, None);
}
