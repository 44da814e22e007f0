//! Startup errors of the server binary.

use chatgate_cache::ConfigError;
use chatgate_ratelimit::RateLimitError;

/// Anything that stops the server from starting.
///
/// Request-time failures never surface here: the cache facade folds them
/// into fail-open or fail-closed decisions.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache initialization failed: {0}")]
    Cache(#[from] ConfigError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cache_config_error() {
        let err: ServerError = ConfigError::Unreachable("connection refused".into()).into();
        assert!(matches!(err, ServerError::Cache(_)));
        assert!(err.to_string().starts_with("Cache initialization failed"));
    }
}
