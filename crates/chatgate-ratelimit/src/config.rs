//! Rate limiting configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//!
//! [rate_limit.default_rule]
//! limit = 120
//! window = "1m"
//!
//! [[rate_limit.rules]]
//! path_prefix = "/auth/login"
//! method = "POST"
//! limit = 5
//! window = "1m"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::escalation::EscalationPolicy;

/// Root rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// When disabled, every request is allowed without touching the cache.
    pub enabled: bool,

    /// Applied to paths no rule matches.
    pub default_rule: LimitRule,

    /// Per-endpoint overrides. Longest matching prefix wins.
    pub rules: Vec<EndpointRule>,

    pub escalation: EscalationPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_rule: LimitRule::new(120, Duration::from_secs(60)),
            rules: vec![
                EndpointRule::new("/auth/login", Some("POST"), 5, Duration::from_secs(60)),
                EndpointRule::new("/auth/register", Some("POST"), 3, Duration::from_secs(3600)),
                EndpointRule::new("/api/chat", Some("POST"), 30, Duration::from_secs(60)),
                EndpointRule::new("/api/upload", None, 10, Duration::from_secs(60)),
            ],
            escalation: EscalationPolicy::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.default_rule
            .validate()
            .map_err(|e| format!("rate_limit.default_rule: {e}"))?;
        for rule in &self.rules {
            if !rule.path_prefix.starts_with('/') {
                return Err(format!(
                    "rate_limit.rules: path_prefix '{}' must start with '/'",
                    rule.path_prefix
                ));
            }
            rule.rule()
                .validate()
                .map_err(|e| format!("rate_limit.rules[{}]: {e}", rule.path_prefix))?;
        }
        self.escalation.validate()
    }
}

/// Request budget: at most `limit` requests per trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitRule {
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl LimitRule {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("limit must be > 0".into());
        }
        if self.window.as_secs() == 0 {
            return Err("window must be at least one second".into());
        }
        Ok(())
    }
}

/// Budget applied to requests whose path starts with `path_prefix` and, when
/// set, whose method equals `method`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointRule {
    pub path_prefix: String,
    #[serde(default)]
    pub method: Option<String>,
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl EndpointRule {
    pub fn new(path_prefix: &str, method: Option<&str>, limit: u32, window: Duration) -> Self {
        Self {
            path_prefix: path_prefix.to_string(),
            method: method.map(str::to_string),
            limit,
            window,
        }
    }

    pub fn rule(&self) -> LimitRule {
        LimitRule::new(self.limit, self.window)
    }
}
