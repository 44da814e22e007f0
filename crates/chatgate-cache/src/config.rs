//! Cache configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [cache]
//! key_prefix = "chatgate"
//! default_ttl = "1h"
//! sweep_interval = "5m"
//!
//! [cache.redis]
//! url = "redis://localhost:6379"
//! pool_size = 10
//! timeout_ms = 2000
//! ```
//!
//! Leaving out `[cache.redis]` selects the in-process expiring store.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Root cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fixed prefix of every physical key (`<prefix>:<namespace>:<key>`).
    pub key_prefix: String,

    /// Lifetime given to counters created by `increment`.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Interval of the expiring store's background sweep.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Networked backend. `None` selects the local expiring store.
    pub redis: Option<RedisConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "chatgate".to_string(),
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300), // 5 minutes
            redis: None,
        }
    }
}

impl CacheConfig {
    /// Resolves which backend this configuration selects.
    #[must_use]
    pub fn selection(&self) -> BackendSelection {
        match &self.redis {
            Some(redis) => BackendSelection::Networked(redis.clone()),
            None => BackendSelection::Local,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "cache.key_prefix must not be empty".to_string(),
            ));
        }
        if self.key_prefix.contains(':') {
            return Err(ConfigError::InvalidValue(
                "cache.key_prefix must not contain ':'".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.default_ttl must be > 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.sweep_interval must be > 0".to_string(),
            ));
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }
}

/// Networked cache service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL (e.g., "redis://localhost:6379/0").
    pub url: String,

    /// Optional auth token. Overrides any password embedded in `url`.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Connection pool size.
    pub pool_size: usize,

    /// Bound applied to every networked call, in milliseconds.
    pub timeout_ms: u64,

    /// Refuse to start when the service cannot be reached at startup.
    pub require_reachable: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            auth_token: None,
            pool_size: 10,
            timeout_ms: 2000,
            require_reachable: false,
        }
    }
}

impl RedisConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builds the connection URL, folding in `auth_token` when present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the URL cannot be parsed or
    /// does not use a `redis`/`rediss` scheme.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidValue(format!("cache.redis.url: {e}")))?;

        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(ConfigError::InvalidValue(format!(
                "cache.redis.url scheme must be redis or rediss, got '{}'",
                url.scheme()
            )));
        }

        if let Some(token) = self.auth_token.as_deref().filter(|t| !t.is_empty()) {
            url.set_password(Some(token)).map_err(|()| {
                ConfigError::InvalidValue("cache.redis.url cannot carry credentials".to_string())
            })?;
        }

        Ok(url.to_string())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection_url()?;
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.redis.pool_size must be > 0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.redis.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend chosen once, at construction.
#[derive(Debug, Clone)]
pub enum BackendSelection {
    /// Use the networked cache service.
    Networked(RedisConfig),
    /// Use the in-process expiring store (single-instance only).
    Local,
}
