//! Endpoint → budget resolution.

use crate::config::{EndpointRule, LimitRule, RateLimitConfig};

/// Label used for requests that fall through to the default rule. All such
/// requests from one identity share a single window.
pub const DEFAULT_ENDPOINT: &str = "*";

/// A resolved budget and the endpoint label its window is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    pub endpoint: String,
    pub rule: LimitRule,
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct EndpointRules {
    default_rule: LimitRule,
    rules: Vec<EndpointRule>,
}

impl EndpointRules {
    pub fn new(default_rule: LimitRule, mut rules: Vec<EndpointRule>) -> Self {
        // Longest prefix first; method-specific before method-agnostic.
        rules.sort_by(|a, b| {
            b.path_prefix
                .len()
                .cmp(&a.path_prefix.len())
                .then_with(|| b.method.is_some().cmp(&a.method.is_some()))
        });
        Self {
            default_rule,
            rules,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.default_rule, config.rules.clone())
    }

    /// Finds the budget for `method path`.
    pub fn resolve(&self, method: &str, path: &str) -> ResolvedRule {
        self.rules
            .iter()
            .find(|rule| {
                path_matches(path, &rule.path_prefix)
                    && rule
                        .method
                        .as_deref()
                        .is_none_or(|m| m.eq_ignore_ascii_case(method))
            })
            .map(|rule| ResolvedRule {
                endpoint: rule.path_prefix.clone(),
                rule: rule.rule(),
            })
            .unwrap_or_else(|| ResolvedRule {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                rule: self.default_rule,
            })
    }
}

/// Prefix match on path segment boundaries: `/api/chat` matches
/// `/api/chat` and `/api/chat/42` but not `/api/chatter`.
fn path_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
