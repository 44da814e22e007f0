//! Backend-agnostic cache facade.
//!
//! [`CacheManager`] is constructed once at process start and handed to every
//! component that needs it. It picks exactly one backend at construction:
//!
//! - `cache.redis` configured → [`RedisStore`]
//! - otherwise → [`ExpiringStore`]
//!
//! There is no per-call fallback. A failed networked call is reported to the
//! caller as a failure; silently serving it from the local map would split one
//! logical key across two backends.
//!
//! ## Error folding
//!
//! Backend errors never leave this type. Writes report `bool`, reads report
//! `Option` (or [`Lookup`] when the caller must tell "missing" from
//! "backend unavailable"), and a value that fails to decode reads as missing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{BackendSelection, CacheConfig};
use crate::error::{CacheError, ConfigError};
use crate::key::KeyBuilder;
use crate::local::ExpiringStore;
use crate::metrics::record_operation;
use crate::networked::RedisStore;
use crate::store::{BackendKind, CacheStore};

/// Result of a read that distinguishes an outage from a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// A live, decodable value.
    Found(T),
    /// No live entry, or an entry that could not be decoded.
    Missing,
    /// The backend could not answer.
    Unavailable,
}

impl<T> Lookup<T> {
    /// Collapses to `Option`, treating `Unavailable` as absent.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Unavailable => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Missing => Lookup::Missing,
            Self::Unavailable => Lookup::Unavailable,
        }
    }
}

/// Health snapshot for readiness probes.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub backend: BackendKind,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_entries: Option<usize>,
}

/// Cache facade shared by the rate limiter and the session store.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    keys: KeyBuilder,
    default_ttl: Duration,
}

impl CacheManager {
    /// Builds the manager for `config`, resolving the backend once.
    ///
    /// With a networked backend configured, a startup `PING` is attempted.
    /// If it fails the manager still uses the networked backend (calls will
    /// fail until it recovers) unless `require_reachable` is set, in which
    /// case construction fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for invalid configuration or, with
    /// `require_reachable`, an unreachable backend.
    pub async fn connect(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        match config.selection() {
            BackendSelection::Local => {
                tracing::info!(
                    sweep_interval = ?config.sweep_interval,
                    "No networked cache configured, using local expiring store (single-instance only)"
                );
                Ok(Self::local(config))
            }
            BackendSelection::Networked(redis_config) => {
                let store = RedisStore::from_config(&redis_config)?;
                tracing::info!(timeout_ms = redis_config.timeout_ms, "Connecting to Redis");

                match store.ping().await {
                    Ok(()) => tracing::info!("Connected to Redis"),
                    Err(e) if redis_config.require_reachable => {
                        return Err(ConfigError::Unreachable(e.to_string()));
                    }
                    Err(e) => tracing::warn!(
                        error = %e,
                        "Redis not reachable at startup; cache calls will fail until it recovers"
                    ),
                }

                Ok(Self::with_store(Arc::new(store), config))
            }
        }
    }

    /// Builds a manager on a fresh local expiring store.
    pub fn local(config: &CacheConfig) -> Self {
        Self::with_store(Arc::new(ExpiringStore::new(config.sweep_interval)), config)
    }

    /// Builds a manager on an explicit store.
    pub fn with_store(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(config.key_prefix.clone()),
            default_ttl: config.default_ttl,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.store.kind()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn report<T>(&self, op: &'static str, key: &str, result: Result<T, CacheError>) -> Option<T> {
        let backend = self.store.kind();
        match result {
            Ok(value) => {
                record_operation(backend, op, "ok");
                Some(value)
            }
            Err(e) => {
                record_operation(backend, op, "error");
                tracing::warn!(backend = %backend, op, key = %key, error = %e, "cache operation failed");
                None
            }
        }
    }

    /// Stores `value` for `ttl`. Returns `false` if the value could not be
    /// serialized, `ttl` is zero, or the backend failed.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration, namespace: Option<&str>) -> bool
    where
        T: Serialize + ?Sized,
    {
        let physical = self.keys.key(key, namespace);
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %physical, error = %e, "cache value serialization failed");
                return false;
            }
        };
        let result = self.store.set(&physical, bytes, ttl).await;
        self.report("set", &physical, result).is_some()
    }

    /// Returns the live value, or `None` when missing, undecodable or the
    /// backend failed.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, namespace: Option<&str>) -> Option<T> {
        self.lookup(key, namespace).await.found()
    }

    /// Like [`get`](Self::get) but reports a backend outage separately.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str, namespace: Option<&str>) -> Lookup<T> {
        let physical = self.keys.key(key, namespace);
        let backend = self.store.kind();

        let bytes = match self.store.get(&physical).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                record_operation(backend, "get", "miss");
                return Lookup::Missing;
            }
            Err(e) => {
                record_operation(backend, "get", "error");
                tracing::warn!(backend = %backend, key = %physical, error = %e, "cache read failed");
                return Lookup::Unavailable;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                record_operation(backend, "get", "hit");
                Lookup::Found(value)
            }
            Err(e) => {
                record_operation(backend, "get", "corrupt");
                tracing::debug!(key = %physical, error = %e, "undecodable cache entry treated as absent");
                Lookup::Missing
            }
        }
    }

    /// Removes the entry. Returns `false` only when the backend failed;
    /// deleting a missing key succeeds.
    pub async fn delete(&self, key: &str, namespace: Option<&str>) -> bool {
        let physical = self.keys.key(key, namespace);
        let result = self.store.delete(&physical).await;
        self.report("delete", &physical, result).is_some()
    }

    /// Whether a live entry exists. A backend failure reads as `false`.
    pub async fn exists(&self, key: &str, namespace: Option<&str>) -> bool {
        self.contains(key, namespace).await.is_found()
    }

    /// Existence check that reports a backend outage separately.
    pub async fn contains(&self, key: &str, namespace: Option<&str>) -> Lookup<()> {
        let physical = self.keys.key(key, namespace);
        match self.report("exists", &physical, self.store.exists(&physical).await) {
            Some(true) => Lookup::Found(()),
            Some(false) => Lookup::Missing,
            None => Lookup::Unavailable,
        }
    }

    /// Increments the counter, creating it with the default TTL.
    /// Returns `None` on failure; callers decide between fail-open and
    /// fail-closed.
    pub async fn increment(&self, key: &str, namespace: Option<&str>) -> Option<i64> {
        self.increment_with_ttl(key, self.default_ttl, namespace)
            .await
    }

    /// Increments the counter, creating it with `ttl`. A live counter keeps
    /// its current expiry.
    pub async fn increment_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> Option<i64> {
        let physical = self.keys.key(key, namespace);
        let result = self.store.increment(&physical, ttl).await;
        self.report("increment", &physical, result)
    }

    /// Lists the logical keys live in `namespace`.
    pub async fn keys(&self, namespace: Option<&str>) -> Option<Vec<String>> {
        let prefix = self.keys.namespace_prefix(namespace);
        let physical = self
            .report("keys", &prefix, self.store.keys_with_prefix(&prefix).await)?;

        Some(
            physical
                .iter()
                .filter_map(|key| self.keys.logical(key, namespace))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Deletes every entry in `namespace`. Returns how many were removed.
    pub async fn clear_namespace(&self, namespace: Option<&str>) -> Option<u64> {
        let prefix = self.keys.namespace_prefix(namespace);
        let removed = self.report("clear", &prefix, self.store.delete_prefix(&prefix).await)?;
        tracing::info!(namespace = namespace.unwrap_or(crate::key::DEFAULT_NAMESPACE), removed, "cache namespace cleared");
        Some(removed)
    }

    /// Pings the backend.
    pub async fn health(&self) -> CacheHealth {
        let healthy = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = %self.store.kind(), error = %e, "cache health check failed");
                false
            }
        };
        CacheHealth {
            backend: self.store.kind(),
            healthy,
            local_entries: self.store.local_entries(),
        }
    }

    /// Stops background work owned by the backend.
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
        tracing::debug!(backend = %self.store.kind(), "cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn manager() -> CacheManager {
        CacheManager::local(&CacheConfig::default())
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        visits: u32,
    }

    #[tokio::test]
    async fn test_structured_values() {
        let cache = manager();
        let profile = Profile {
            name: "ada".to_string(),
            visits: 3,
        };
        assert!(cache.set("p", &profile, Duration::from_secs(60), Some("profiles")).await);
        assert_eq!(
            cache.get::<Profile>("p", Some("profiles")).await,
            Some(profile)
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_missing() {
        let cache = manager();
        assert!(cache.set("p", "not a profile", Duration::from_secs(60), None).await);
        assert_eq!(cache.lookup::<Profile>("p", None).await, Lookup::Missing);
        assert!(cache.exists("p", None).await);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_refused() {
        let cache = manager();
        assert!(!cache.set("k", &1, Duration::ZERO, None).await);
        assert!(!cache.exists("k", None).await);
    }

    #[tokio::test]
    async fn test_increment_readable_as_integer() {
        let cache = manager();
        assert_eq!(cache.increment("hits", Some("stats")).await, Some(1));
        assert_eq!(cache.increment("hits", Some("stats")).await, Some(2));
        assert_eq!(cache.get::<i64>("hits", Some("stats")).await, Some(2));
    }

    #[tokio::test]
    async fn test_increment_on_non_integer_fails() {
        let cache = manager();
        assert!(cache.set("k", "text", Duration::from_secs(60), None).await);
        assert_eq!(cache.increment("k", None).await, None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = manager();
        assert!(cache.set("k", &1, Duration::from_secs(60), None).await);
        assert!(cache.delete("k", None).await);
        assert!(cache.delete("k", None).await);
        assert!(!cache.exists("k", None).await);
    }

    #[tokio::test]
    async fn test_keys_and_clear_namespace() {
        let cache = manager();
        let ttl = Duration::from_secs(60);
        assert!(cache.set("a", &1, ttl, Some("ns1")).await);
        assert!(cache.set("b", &2, ttl, Some("ns1")).await);
        assert!(cache.set("a", &3, ttl, Some("ns2")).await);

        let mut keys = cache.keys(Some("ns1")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(cache.clear_namespace(Some("ns1")).await, Some(2));
        assert_eq!(cache.get::<i32>("a", Some("ns2")).await, Some(3));
        assert!(cache.keys(Some("ns1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_local() {
        let cache = manager();
        assert!(cache.set("k", &1, Duration::from_secs(60), None).await);
        let health = cache.health().await;
        assert!(health.healthy);
        assert_eq!(health.backend, BackendKind::Local);
        assert_eq!(health.local_entries, Some(1));
    }

    #[test]
    fn test_lookup_helpers() {
        assert_eq!(Lookup::Found(2).map(|v| v * 2), Lookup::Found(4));
        assert_eq!(Lookup::<i32>::Unavailable.found(), None);
        assert!(Lookup::<i32>::Unavailable.is_unavailable());
        assert!(!Lookup::<i32>::Missing.is_found());
    }
}
