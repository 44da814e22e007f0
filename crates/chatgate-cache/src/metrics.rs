//! Cache operation counters.

use metrics::counter;

use crate::store::BackendKind;

pub const CACHE_OPERATIONS_TOTAL: &str = "cache_operations_total";

/// Record one facade operation and how it ended
/// (`hit`, `miss`, `ok`, `corrupt`, `error`).
pub(crate) fn record_operation(backend: BackendKind, op: &'static str, outcome: &'static str) {
    counter!(
        CACHE_OPERATIONS_TOTAL,
        "backend" => backend.as_str(),
        "op" => op,
        "outcome" => outcome
    )
    .increment(1);
}
