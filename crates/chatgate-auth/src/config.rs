//! Session store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a blacklist check answers when the cache cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the token as not revoked. Availability over strictness.
    #[default]
    Open,
    /// Treat the token as revoked. Every authenticated call fails during an
    /// outage.
    Closed,
}

/// # Example (TOML)
///
/// ```toml
/// [session]
/// blacklist_failure_policy = "closed"
/// max_session_ttl = "30days"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub blacklist_failure_policy: FailurePolicy,

    /// Upper bound for a session lifetime passed to `create_session`.
    #[serde(with = "humantime_serde")]
    pub max_session_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            blacklist_failure_policy: FailurePolicy::Open,
            max_session_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_session_ttl.as_secs() == 0 {
            return Err("session.max_session_ttl must be at least one second".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.blacklist_failure_policy, FailurePolicy::Open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_policy() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"blacklist_failure_policy":"closed","max_session_ttl":"12h"}"#).unwrap();
        assert_eq!(config.blacklist_failure_policy, FailurePolicy::Closed);
        assert_eq!(config.max_session_ttl, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_zero_max_ttl_is_invalid() {
        let config = SessionConfig {
            max_session_ttl: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
