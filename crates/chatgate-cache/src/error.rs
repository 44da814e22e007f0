//! Cache error types.
//!
//! These errors describe failures inside a single cache backend. They stay
//! within this crate: [`CacheManager`](crate::CacheManager) converts every one
//! of them into a boolean, `Option` or [`Lookup`](crate::Lookup) result before
//! anything reaches callers.

use std::time::Duration;

/// Errors raised by a [`CacheStore`](crate::CacheStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A connection to the networked backend could not be obtained.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The networked backend rejected or failed a command.
    #[error("Backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// The operation did not complete within the configured bound.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// `increment` was applied to a value that is not an integer.
    #[error("Value at '{key}' is not an integer")]
    NotAnInteger {
        /// The offending physical key.
        key: String,
    },

    /// A zero TTL was supplied; every entry must expire.
    #[error("TTL must be greater than zero")]
    ZeroTtl,
}

impl CacheError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true when the failure means the backend could not be reached,
    /// as opposed to a well-formed rejection of the request.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout(_))
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Backend { .. } => "backend",
            Self::Timeout(_) => "timeout",
            Self::NotAnInteger { .. } => "not_an_integer",
            Self::ZeroTtl => "zero_ttl",
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::connection(err.to_string())
        } else {
            Self::backend(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::connection(err.to_string())
    }
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The networked backend is required but could not be reached.
    #[error("Cache backend unreachable: {0}")]
    Unreachable(String),
}

/// Type alias for cache backend results.
pub type CacheResult<T> = Result<T, CacheError>;
