//! Sliding-window rate limiter over the cache facade.
//!
//! State per (identity, endpoint), all in the cache with a TTL:
//!
//! | namespace              | value                         | TTL              |
//! |------------------------|-------------------------------|------------------|
//! | `ratelimit_window`     | admission timestamps (ms)     | window           |
//! | `ratelimit_block`      | [`BlockState`]                | block duration   |
//! | `ratelimit_escalation` | [`EscalationState`]           | escalation cool-down |
//!
//! When the cache cannot be read the limiter fails open: the request is
//! allowed and the decision is flagged.

use std::sync::Arc;
use std::time::Duration;

use chatgate_cache::{CacheManager, Lookup};
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::{LimitRule, RateLimitConfig};
use crate::error::RateLimitError;
use crate::escalation::EscalationPolicy;
use crate::violation::{ViolationRecord, ViolationStore};
use crate::window::{self, WindowOutcome};

pub const WINDOW_NAMESPACE: &str = "ratelimit_window";
pub const BLOCK_NAMESPACE: &str = "ratelimit_block";
pub const ESCALATION_NAMESPACE: &str = "ratelimit_escalation";

pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";

/// Who is asking for what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRequest {
    /// User id, token identifier or client address.
    pub identity: String,
    pub endpoint: String,
    pub method: Option<String>,
}

impl RateLimitRequest {
    pub fn new(identity: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            endpoint: endpoint.into(),
            method: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Set on denial: seconds the caller should wait.
    pub retry_after_seconds: Option<u64>,
    /// Seconds until the oldest counted request leaves the window.
    pub reset_after_seconds: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub blocked_until: Option<OffsetDateTime>,
    /// Allowed only because the cache was unreachable.
    pub fail_open: bool,
}

impl RateLimitDecision {
    fn allow(limit: u32, remaining: u32, reset_after_seconds: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after_seconds: None,
            reset_after_seconds,
            blocked_until: None,
            fail_open: false,
        }
    }

    fn deny(limit: u32, retry_after_seconds: u64, blocked_until: Option<OffsetDateTime>) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after_seconds: Some(retry_after_seconds),
            reset_after_seconds: retry_after_seconds,
            blocked_until,
            fail_open: false,
        }
    }

    fn fail_open(limit: u32, window: Duration) -> Self {
        Self {
            fail_open: true,
            ..Self::allow(limit, limit, window.as_secs())
        }
    }

    /// Standard rate limit response headers.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_after_seconds.to_string()),
        ];
        if let Some(retry_after) = self.retry_after_seconds {
            headers.push(("Retry-After", retry_after.to_string()));
        }
        headers
    }
}

/// Active block for one (identity, endpoint).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockState {
    pub blocked_until_ms: i64,
    pub violation_count: u32,
}

/// Consecutive violations inside the cool-down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationState {
    pub count: u32,
    pub first_ms: i64,
    pub last_ms: i64,
}

/// Per-identity, per-endpoint sliding-window limiter.
///
/// Cloning is cheap; clones share the cache and violation store.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheManager,
    policy: EscalationPolicy,
    violations: Option<Arc<dyn ViolationStore>>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(cache: CacheManager, policy: EscalationPolicy) -> Self {
        Self {
            cache,
            policy,
            violations: None,
            enabled: true,
        }
    }

    /// Builds a limiter from validated configuration.
    pub fn from_config(cache: CacheManager, config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        config.validate().map_err(RateLimitError::InvalidConfig)?;
        Ok(Self {
            enabled: config.enabled,
            ..Self::new(cache, config.escalation.clone())
        })
    }

    /// Persists a [`ViolationRecord`] for every denial that escalates.
    pub fn with_violation_store(mut self, store: Arc<dyn ViolationStore>) -> Self {
        self.violations = Some(store);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Checks `(identity, endpoint)` against `limit` requests per
    /// `window_seconds` and records the request when it is admitted.
    pub async fn check_and_record(
        &self,
        identity: &str,
        endpoint: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        let request = RateLimitRequest::new(identity, endpoint);
        self.check(&request, LimitRule::new(limit, Duration::from_secs(window_seconds)))
            .await
    }

    /// Checks a request against `rule`.
    pub async fn check(&self, request: &RateLimitRequest, rule: LimitRule) -> RateLimitDecision {
        self.check_at(request, rule, OffsetDateTime::now_utc()).await
    }

    /// [`check`](Self::check) with an explicit clock.
    pub async fn check_at(
        &self,
        request: &RateLimitRequest,
        rule: LimitRule,
        now: OffsetDateTime,
    ) -> RateLimitDecision {
        let decision = self.evaluate(request, rule, now).await;
        record_decision(&decision);
        decision
    }

    async fn evaluate(&self, request: &RateLimitRequest, rule: LimitRule, now: OffsetDateTime) -> RateLimitDecision {
        let LimitRule { limit, window } = rule;
        if !self.enabled {
            return RateLimitDecision::allow(limit, limit, 0);
        }
        if limit == 0 {
            return RateLimitDecision::deny(0, window.as_secs().max(1), None);
        }

        let now_ms = unix_ms(now);
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
        let key = window_key(&request.identity, &request.endpoint);

        if let Lookup::Found(block) = self.cache.lookup::<BlockState>(&key, Some(BLOCK_NAMESPACE)).await
            && block.blocked_until_ms > now_ms
        {
            tracing::debug!(
                identity = %request.identity,
                endpoint = %request.endpoint,
                violations = block.violation_count,
                "request rejected by active block"
            );
            return RateLimitDecision::deny(
                limit,
                window::ceil_seconds(block.blocked_until_ms - now_ms),
                from_unix_ms(block.blocked_until_ms),
            );
        }

        let mut timestamps = match self.cache.lookup::<Vec<i64>>(&key, Some(WINDOW_NAMESPACE)).await {
            Lookup::Found(timestamps) => timestamps,
            Lookup::Missing => Vec::new(),
            Lookup::Unavailable => {
                tracing::warn!(
                    identity = %request.identity,
                    endpoint = %request.endpoint,
                    fail_open = true,
                    "rate limit state unavailable, allowing request"
                );
                return RateLimitDecision::fail_open(limit, window);
            }
        };

        match window::admit(&mut timestamps, now_ms, limit, window_ms) {
            WindowOutcome::Admitted {
                remaining,
                reset_after_ms,
            } => {
                if !self.cache.set(&key, &timestamps, window, Some(WINDOW_NAMESPACE)).await {
                    tracing::warn!(
                        identity = %request.identity,
                        endpoint = %request.endpoint,
                        fail_open = true,
                        "rate limit window not recorded"
                    );
                }
                RateLimitDecision::allow(limit, remaining, window::ceil_seconds(reset_after_ms))
            }
            WindowOutcome::Rejected { retry_after_ms } => {
                self.escalate(request, &key, rule, retry_after_ms, now_ms).await
            }
        }
    }

    async fn escalate(
        &self,
        request: &RateLimitRequest,
        key: &str,
        rule: LimitRule,
        retry_after_ms: i64,
        now_ms: i64,
    ) -> RateLimitDecision {
        let fresh = EscalationState {
            count: 0,
            first_ms: now_ms,
            last_ms: now_ms,
        };
        let previous = self
            .cache
            .get::<EscalationState>(key, Some(ESCALATION_NAMESPACE))
            .await
            .unwrap_or(fresh);
        let state = EscalationState {
            count: previous.count.saturating_add(1),
            first_ms: previous.first_ms,
            last_ms: now_ms,
        };

        let window_reset = Duration::from_millis(u64::try_from(retry_after_ms).unwrap_or(0));
        let block = self.policy.block_for(state.count, window_reset, rule.window);
        let block_ms = i64::try_from(block.as_millis()).unwrap_or(i64::MAX);
        let blocked_until_ms = now_ms.saturating_add(block_ms);

        self.cache
            .set(key, &state, self.policy.cooldown, Some(ESCALATION_NAMESPACE))
            .await;
        let block_state = BlockState {
            blocked_until_ms,
            violation_count: state.count,
        };
        self.cache
            .set(key, &block_state, ttl_for(block), Some(BLOCK_NAMESPACE))
            .await;

        let blocked_until = from_unix_ms(blocked_until_ms);
        tracing::info!(
            identity = %request.identity,
            endpoint = %request.endpoint,
            violations = state.count,
            block_seconds = block.as_secs(),
            "rate limit exceeded"
        );

        self.persist_violation(request, &state, blocked_until).await;

        RateLimitDecision::deny(rule.limit, window::ceil_seconds(block_ms), blocked_until)
    }

    async fn persist_violation(
        &self,
        request: &RateLimitRequest,
        state: &EscalationState,
        blocked_until: Option<OffsetDateTime>,
    ) {
        let Some(store) = &self.violations else {
            return;
        };

        let last = from_unix_ms(state.last_ms).unwrap_or_else(OffsetDateTime::now_utc);
        let record = ViolationRecord {
            first_violation: from_unix_ms(state.first_ms).unwrap_or(last),
            blocked_until,
            ..ViolationRecord::new(&request.identity, &request.endpoint, request.method.as_deref(), last)
        };

        if let Err(e) = store.record(&record).await {
            tracing::warn!(
                identity = %request.identity,
                endpoint = %request.endpoint,
                error = %e,
                "failed to persist rate limit violation"
            );
        }
    }

    /// Clears window, block and escalation state for `(identity, endpoint)`.
    /// Returns `false` if any delete failed.
    pub async fn reset(&self, identity: &str, endpoint: &str) -> bool {
        let key = window_key(identity, endpoint);
        let mut ok = true;
        for namespace in [WINDOW_NAMESPACE, BLOCK_NAMESPACE, ESCALATION_NAMESPACE] {
            ok &= self.cache.delete(&key, Some(namespace)).await;
        }
        tracing::info!(identity = %identity, endpoint = %endpoint, ok, "rate limit state reset");
        ok
    }
}

/// Cache key for one (identity, endpoint). The length prefix keeps
/// `("a:b", "c")` and `("a", "b:c")` apart.
fn window_key(identity: &str, endpoint: &str) -> String {
    format!("{}:{}:{}", identity.len(), identity, endpoint)
}

/// Whole-second TTL covering `block`.
fn ttl_for(block: Duration) -> Duration {
    Duration::from_secs(block.as_millis().div_ceil(1000).max(1) as u64)
}

fn unix_ms(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

fn record_decision(decision: &RateLimitDecision) {
    let label = if decision.fail_open {
        "fail_open"
    } else if decision.allowed {
        "allowed"
    } else {
        "denied"
    };
    counter!(RATE_LIMIT_DECISIONS_TOTAL, "decision" => label).increment(1);
}
