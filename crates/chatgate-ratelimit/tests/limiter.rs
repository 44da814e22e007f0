//! Rate limiter behavior against the cache facade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatgate_cache::{BackendKind, CacheConfig, CacheError, CacheManager, CacheResult, CacheStore};
use chatgate_ratelimit::{
    EndpointRules, EscalationPolicy, InMemoryViolationStore, LimitRule, RateLimitConfig,
    RateLimitError, RateLimitRequest, RateLimiter, ViolationRecord, ViolationResult,
    ViolationStore, ViolationStoreError,
};

fn local_limiter() -> RateLimiter {
    RateLimiter::new(CacheManager::local(&CacheConfig::default()), EscalationPolicy::default())
}

/// A backend that is always down.
struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Networked
    }
    async fn set(&self, _: &str, _: Vec<u8>, _: Duration) -> CacheResult<()> {
        Err(CacheError::connection("connection refused"))
    }
    async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::connection("connection refused"))
    }
    async fn delete(&self, _: &str) -> CacheResult<bool> {
        Err(CacheError::connection("connection refused"))
    }
    async fn exists(&self, _: &str) -> CacheResult<bool> {
        Err(CacheError::connection("connection refused"))
    }
    async fn increment(&self, _: &str, _: Duration) -> CacheResult<i64> {
        Err(CacheError::connection("connection refused"))
    }
    async fn keys_with_prefix(&self, _: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::connection("connection refused"))
    }
    async fn delete_prefix(&self, _: &str) -> CacheResult<u64> {
        Err(CacheError::connection("connection refused"))
    }
    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::connection("connection refused"))
    }
}

/// A violation store that rejects every write.
struct BrokenViolationStore;

#[async_trait]
impl ViolationStore for BrokenViolationStore {
    async fn record(&self, _: &ViolationRecord) -> ViolationResult<ViolationRecord> {
        Err(ViolationStoreError::unavailable("database offline"))
    }
    async fn find(&self, _: &str, _: &str) -> ViolationResult<Option<ViolationRecord>> {
        Err(ViolationStoreError::unavailable("database offline"))
    }
}

#[tokio::test]
async fn five_per_minute_then_denied() {
    let limiter = local_limiter();

    let mut remaining = Vec::new();
    for _ in 0..5 {
        let decision = limiter.check_and_record("user1", "/login", 5, 60).await;
        assert!(decision.allowed);
        assert_eq!(decision.retry_after_seconds, None);
        remaining.push(decision.remaining);
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let denied = limiter.check_and_record("user1", "/login", 5, 60).await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    let retry_after = denied.retry_after_seconds.expect("retry hint on denial");
    assert!(retry_after > 0 && retry_after <= 60);
    assert!(denied.blocked_until.is_some());
}

#[tokio::test]
async fn identities_and_endpoints_are_independent() {
    let limiter = local_limiter();

    assert!(limiter.check_and_record("user1", "/login", 1, 60).await.allowed);
    assert!(!limiter.check_and_record("user1", "/login", 1, 60).await.allowed);

    assert!(limiter.check_and_record("user2", "/login", 1, 60).await.allowed);
    assert!(limiter.check_and_record("user1", "/chat", 1, 60).await.allowed);
}

#[tokio::test]
async fn zero_limit_always_denies() {
    let limiter = local_limiter();
    let decision = limiter.check_and_record("user1", "/admin", 0, 30).await;
    assert!(!decision.allowed);
    assert_eq!(decision.retry_after_seconds, Some(30));
}

#[tokio::test]
async fn window_slides_after_expiry() {
    let limiter = local_limiter();

    assert!(limiter.check_and_record("user1", "/ping", 1, 1).await.allowed);
    assert!(!limiter.check_and_record("user1", "/ping", 1, 1).await.allowed);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(limiter.check_and_record("user1", "/ping", 1, 1).await.allowed);
}

#[tokio::test]
async fn denial_persists_violation_record() {
    let store = Arc::new(InMemoryViolationStore::new());
    let limiter = local_limiter().with_violation_store(store.clone());
    let request = RateLimitRequest::new("10.0.0.7", "/auth/login").with_method("POST");
    let rule = LimitRule::new(1, Duration::from_secs(60));

    assert!(limiter.check(&request, rule).await.allowed);
    assert!(store.is_empty());

    let denied = limiter.check(&request, rule).await;
    assert!(!denied.allowed);

    let record = store
        .find("10.0.0.7", "/auth/login")
        .await
        .unwrap()
        .expect("violation recorded");
    assert_eq!(record.violation_count, 1);
    assert_eq!(record.method.as_deref(), Some("POST"));
    assert_eq!(record.blocked_until, denied.blocked_until);
}

#[tokio::test]
async fn violation_store_failure_does_not_change_decision() {
    let limiter = local_limiter().with_violation_store(Arc::new(BrokenViolationStore));

    assert!(limiter.check_and_record("user1", "/login", 1, 60).await.allowed);
    let denied = limiter.check_and_record("user1", "/login", 1, 60).await;
    assert!(!denied.allowed);
    assert!(denied.retry_after_seconds.is_some());
}

#[tokio::test]
async fn unavailable_cache_fails_open() {
    let cache = CacheManager::with_store(Arc::new(DownStore), &CacheConfig::default());
    let limiter = RateLimiter::new(cache, EscalationPolicy::default());

    for _ in 0..10 {
        let decision = limiter.check_and_record("user1", "/login", 2, 60).await;
        assert!(decision.allowed);
        assert!(decision.fail_open);
    }
}

#[tokio::test]
async fn reset_lifts_block() {
    let limiter = local_limiter();

    assert!(limiter.check_and_record("user1", "/login", 1, 60).await.allowed);
    assert!(!limiter.check_and_record("user1", "/login", 1, 60).await.allowed);

    assert!(limiter.reset("user1", "/login").await);
    assert!(limiter.check_and_record("user1", "/login", 1, 60).await.allowed);
}

#[tokio::test]
async fn rules_drive_limits() {
    let config = RateLimitConfig::default();
    let limiter = RateLimiter::from_config(CacheManager::local(&CacheConfig::default()), &config)
        .expect("valid config");
    let rules = EndpointRules::from_config(&config);

    let resolved = rules.resolve("POST", "/auth/login");
    let request = RateLimitRequest::new("user1", resolved.endpoint.clone()).with_method("POST");
    for _ in 0..resolved.rule.limit {
        assert!(limiter.check(&request, resolved.rule).await.allowed);
    }
    assert!(!limiter.check(&request, resolved.rule).await.allowed);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = RateLimitConfig::default();
    config.default_rule.limit = 0;
    let result = RateLimiter::from_config(CacheManager::local(&CacheConfig::default()), &config);
    assert!(matches!(result, Err(RateLimitError::InvalidConfig(_))));
}
