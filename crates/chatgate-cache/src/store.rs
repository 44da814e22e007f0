//! Backend strategy trait.
//!
//! A [`CacheStore`] works on physical keys and raw bytes. Namespacing,
//! serialization and error folding live one level up, in
//! [`CacheManager`](crate::CacheManager).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CacheResult;

/// Which backend a store (or manager) is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendKind {
    /// In-process expiring store; single-instance only.
    #[serde(rename = "local")]
    Local,
    /// Networked cache service shared across instances.
    #[serde(rename = "redis")]
    Networked,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Networked => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage strategy behind the cache facade.
///
/// Implementations must honor lazy expiry: reading an entry whose TTL has
/// passed behaves exactly like reading a missing key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend identity, for logging and health reporting.
    fn kind(&self) -> BackendKind;

    /// Stores `value` under `key` for `ttl`. Overwrites any previous value
    /// and its expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Returns the live value under `key`, if any.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Removes `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Returns whether a live entry exists under `key`.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Adds one to the integer stored under `key`, treating a missing entry
    /// as zero. A newly created counter expires after `ttl`; an existing one
    /// keeps its expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    /// Lists live physical keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>>;

    /// Deletes every key starting with `prefix`. Returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;

    /// Round-trips to the backend.
    async fn ping(&self) -> CacheResult<()>;

    /// Number of entries held in process memory, when the backend has any.
    fn local_entries(&self) -> Option<usize> {
        None
    }

    /// Stops background work owned by the store. Must be idempotent.
    async fn shutdown(&self) {}
}
