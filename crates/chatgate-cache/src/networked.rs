//! Networked cache backend (Redis).
//!
//! Thin adapter from the [`CacheStore`] verbs onto native Redis commands:
//!
//! | Store op           | Redis                              |
//! |--------------------|------------------------------------|
//! | `set`              | `SETEX`                            |
//! | `get`              | `GET`                              |
//! | `delete`           | `DEL`                              |
//! | `exists`           | `EXISTS`                           |
//! | `increment`        | `MULTI INCR TTL EXEC` (+ `EXPIRE`) |
//! | `keys_with_prefix` | `SCAN MATCH`                       |
//! | `delete_prefix`    | `SCAN MATCH` + `DEL`               |
//!
//! Connections come from a `deadpool-redis` pool: they are opened lazily on
//! first use and reused afterwards. Every call is wrapped in the configured
//! timeout so an outage degrades latency instead of hanging the caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::error::{CacheError, CacheResult, ConfigError};
use crate::key::escape_glob;
use crate::store::{BackendKind, CacheStore};

/// Keys fetched per `SCAN` round-trip.
const SCAN_BATCH: usize = 500;

/// Redis-backed cache store.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    timeout: Duration,
}

impl RedisStore {
    /// Builds the connection pool. No connection is opened here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the URL is invalid or the pool
    /// cannot be created.
    pub fn from_config(config: &RedisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.connection_url()?;
        let timeout = config.timeout();

        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = deadpool_redis::Config::from_url(url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| ConfigError::InvalidValue(format!("cache.redis: {e}")))?;

        Ok(Self::new(pool, timeout))
    }

    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Runs `op` against a pooled connection, bounded by the call timeout.
    async fn with_conn<T, F, Fut>(&self, op: F) -> CacheResult<T>
    where
        F: FnOnce(Connection) -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
        T: Send,
    {
        let call = async {
            let conn = self.pool.get().await?;
            op(conn).await
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }

    async fn scan(conn: &mut Connection, pattern: &str) -> CacheResult<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

/// `SETEX` takes whole seconds; round sub-second remainders up so an entry
/// never expires before its requested TTL.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = if ttl.subsec_nanos() > 0 {
        ttl.as_secs() + 1
    } else {
        ttl.as_secs()
    };
    secs.max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Networked
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }
        let secs = ttl_seconds(ttl);
        self.with_conn(|mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, secs).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.with_conn(|mut conn| async move {
            let value = conn.get::<_, Option<Vec<u8>>>(key).await?;
            Ok(value)
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.with_conn(|mut conn| async move {
            let removed = conn.del::<_, i64>(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.with_conn(|mut conn| async move {
            let exists = conn.exists::<_, bool>(key).await?;
            Ok(exists)
        })
        .await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }
        let secs = ttl_seconds(ttl);
        self.with_conn(|mut conn| async move {
            let (value, remaining): (i64, i64) = redis::pipe()
                .atomic()
                .incr(key, 1)
                .ttl(key)
                .query_async(&mut conn)
                .await?;

            // TTL of -1 means the key has no expiry: it was just created by
            // INCR (or written without one). Every cached fact must expire.
            if remaining < 0 {
                let _: () = redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(secs)
                    .query_async(&mut conn)
                    .await?;
            }
            Ok(value)
        })
        .await
        .map_err(|e| match e {
            CacheError::Backend { ref message } if message.contains("not an integer") => {
                CacheError::NotAnInteger {
                    key: key.to_string(),
                }
            }
            other => other,
        })
    }

    async fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        self.with_conn(|mut conn| async move { Self::scan(&mut conn, &pattern).await })
            .await
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        self.with_conn(|mut conn| async move {
            let keys = Self::scan(&mut conn, &pattern).await?;
            let mut removed = 0u64;
            for chunk in keys.chunks(SCAN_BATCH) {
                let count = conn.del::<_, u64>(chunk.to_vec()).await?;
                removed += count;
            }
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.with_conn(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(60)), 60);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
    }

    #[tokio::test]
    async fn test_from_config_is_lazy() {
        // Nothing listens on this port; building the pool must still succeed.
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };
        let store = RedisStore::from_config(&config).expect("pool builds without connecting");
        assert_eq!(store.kind(), BackendKind::Networked);

        let err = store.get("k").await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RedisConfig {
            url: "localhost:6379".to_string(),
            ..RedisConfig::default()
        };
        assert!(RedisStore::from_config(&config).is_err());
    }
}
