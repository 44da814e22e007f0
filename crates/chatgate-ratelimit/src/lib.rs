//! # chatgate-ratelimit
//!
//! Per-identity, per-endpoint sliding-window rate limiting on top of
//! [`chatgate_cache::CacheManager`].
//!
//! ```text
//! request ─→ active block? ──yes──→ deny (no escalation)
//!               │ no
//!               ▼
//!          prune window ─→ under limit? ──yes──→ append, allow
//!                               │ no
//!                               ▼
//!                escalate block ─→ persist ViolationRecord ─→ deny
//! ```
//!
//! The limiter only ever talks to the cache facade, so it behaves the same
//! on Redis and on the in-process store. A cache outage fails open.

pub mod config;
pub mod error;
pub mod escalation;
pub mod limiter;
pub mod rules;
pub mod violation;
pub mod window;

pub use config::{EndpointRule, LimitRule, RateLimitConfig};
pub use error::{RateLimitError, ViolationResult, ViolationStoreError};
pub use escalation::EscalationPolicy;
pub use limiter::{RATE_LIMIT_DECISIONS_TOTAL, RateLimitDecision, RateLimitRequest, RateLimiter};
pub use rules::{DEFAULT_ENDPOINT, EndpointRules, ResolvedRule};
pub use violation::{InMemoryViolationStore, ViolationRecord, ViolationStore};
