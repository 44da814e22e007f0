//! Prometheus exposition for the counters recorded by the library crates.
//!
//! - `cache_operations_total{backend,op,outcome}`
//! - `rate_limit_decisions_total{decision}`
//! - `token_blacklist_checks_total{result}`
//! - `http_requests_total{method,status}`

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub use chatgate_auth::TOKEN_BLACKLIST_CHECKS_TOTAL;
    pub use chatgate_cache::CACHE_OPERATIONS_TOTAL;
    pub use chatgate_ratelimit::RATE_LIMIT_DECISIONS_TOTAL;

    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders from the handle.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            describe_metrics();
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

fn describe_metrics() {
    describe_counter!(
        names::CACHE_OPERATIONS_TOTAL,
        "Cache facade operations by backend, operation and outcome"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Rate limit decisions (allowed, denied, fail_open)"
    );
    describe_counter!(
        names::TOKEN_BLACKLIST_CHECKS_TOTAL,
        "Token blacklist lookups by result"
    );
    describe_counter!(names::HTTP_REQUESTS_TOTAL, "HTTP requests by method and status");
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record an HTTP response.
pub fn record_http_request(method: &str, status: u16) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
