//! Sliding-window log arithmetic.
//!
//! A window is the list of admission timestamps (unix milliseconds) for one
//! (identity, endpoint) pair. Only timestamps newer than `now - window` count.

/// Result of offering one request to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// The request was appended to the window.
    Admitted {
        /// Slots left after this request.
        remaining: u32,
        /// Milliseconds until the oldest counted request leaves the window.
        reset_after_ms: i64,
    },
    /// The window is full. Nothing was appended.
    Rejected {
        /// Milliseconds until the oldest counted request leaves the window.
        retry_after_ms: i64,
    },
}

/// Drops every timestamp at or before `now_ms - window_ms`.
pub fn prune(timestamps: &mut Vec<i64>, now_ms: i64, window_ms: i64) {
    let floor = now_ms - window_ms;
    timestamps.retain(|&t| t > floor);
}

/// Prunes `timestamps` and, if fewer than `limit` remain, records `now_ms`.
pub fn admit(timestamps: &mut Vec<i64>, now_ms: i64, limit: u32, window_ms: i64) -> WindowOutcome {
    prune(timestamps, now_ms, window_ms);

    let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
    if count < limit {
        timestamps.push(now_ms);
        return WindowOutcome::Admitted {
            remaining: limit - count - 1,
            reset_after_ms: until_oldest_expires(timestamps, now_ms, window_ms),
        };
    }

    WindowOutcome::Rejected {
        retry_after_ms: until_oldest_expires(timestamps, now_ms, window_ms),
    }
}

/// Milliseconds until the oldest timestamp leaves the window, clamped to
/// `1..=window_ms`. Timestamps written by a peer with a fast clock may lie in
/// the future; they never push the wait past one window.
fn until_oldest_expires(timestamps: &[i64], now_ms: i64, window_ms: i64) -> i64 {
    match timestamps.iter().min() {
        Some(&oldest) => (oldest + window_ms - now_ms).clamp(1, window_ms),
        None => window_ms,
    }
}

/// Rounds milliseconds up to whole seconds, never below one.
pub fn ceil_seconds(ms: i64) -> u64 {
    let ms = u64::try_from(ms.max(0)).unwrap_or(0);
    ms.div_ceil(1000).max(1)
}
