//! Shared application state handed to every handler and middleware.

use std::sync::Arc;

use chatgate_auth::{InMemorySessionAudit, SessionStore};
use chatgate_cache::CacheManager;
use chatgate_ratelimit::{EndpointRules, InMemoryViolationStore, RateLimiter};

use crate::config::AppConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheManager,
    pub limiter: RateLimiter,
    pub sessions: SessionStore,
    pub rules: Arc<EndpointRules>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connects the cache backend and wires the limiter and session store
    /// on top of it.
    ///
    /// # Errors
    ///
    /// Fails for invalid configuration or, with `cache.redis.require_reachable`,
    /// an unreachable Redis.
    pub async fn build(config: AppConfig) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;
        let cache = CacheManager::connect(&config.cache).await?;
        Self::with_cache(cache, config)
    }

    /// Wires state over an existing cache manager.
    pub fn with_cache(cache: CacheManager, config: AppConfig) -> Result<Self, ServerError> {
        let limiter = RateLimiter::from_config(cache.clone(), &config.rate_limit)?
            .with_violation_store(Arc::new(InMemoryViolationStore::new()));
        let sessions = SessionStore::new(cache.clone(), &config.session)
            .with_audit(Arc::new(InMemorySessionAudit::new()));
        let rules = Arc::new(EndpointRules::from_config(&config.rate_limit));

        tracing::info!(
            backend = %cache.backend(),
            rate_limit_enabled = limiter.is_enabled(),
            blacklist_failure_policy = ?sessions.failure_policy(),
            "application state ready"
        );

        Ok(Self {
            cache,
            limiter,
            sessions,
            rules,
            config: Arc::new(config),
        })
    }
}
