//! Blacklist check counters.

use metrics::counter;

pub const TOKEN_BLACKLIST_CHECKS_TOTAL: &str = "token_blacklist_checks_total";

/// `result` is one of `blacklisted`, `clear`, `unavailable_open`,
/// `unavailable_closed`.
pub(crate) fn record_check(result: &'static str) {
    counter!(TOKEN_BLACKLIST_CHECKS_TOTAL, "result" => result).increment(1);
}
