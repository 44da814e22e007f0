//! Escalating block durations for repeat violators.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a denied identity stays blocked.
///
/// The first violation blocks only until the window resets. Each further
/// violation inside `cooldown` multiplies the block by `multiplier`, capped at
/// `max_block`. Once `cooldown` passes without a violation the count restarts.
///
/// # Example (TOML)
///
/// ```toml
/// [rate_limit.escalation]
/// cooldown = "15m"
/// multiplier = 2
/// max_block = "1h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EscalationPolicy {
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    pub multiplier: u32,

    #[serde(with = "humantime_serde")]
    pub max_block: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(15 * 60),
            multiplier: 2,
            max_block: Duration::from_secs(3600),
        }
    }
}

impl EscalationPolicy {
    /// Block duration for the `violation_count`-th violation in a row.
    ///
    /// `window_reset` is the time until the violated window frees a slot and
    /// `window` the window length. Never shorter than `window_reset`.
    pub fn block_for(&self, violation_count: u32, window_reset: Duration, window: Duration) -> Duration {
        if violation_count <= 1 {
            return window_reset;
        }

        let exponent = violation_count - 1;
        let factor = self.multiplier.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        let escalated = window.checked_mul(factor).unwrap_or(Duration::MAX);

        escalated.min(self.max_block).max(window_reset)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cooldown.is_zero() {
            return Err("rate_limit.escalation.cooldown must be > 0".into());
        }
        if self.multiplier == 0 {
            return Err("rate_limit.escalation.multiplier must be > 0".into());
        }
        if self.max_block.is_zero() {
            return Err("rate_limit.escalation.max_block must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_first_violation_waits_for_window_reset() {
        let policy = EscalationPolicy::default();
        let reset = Duration::from_secs(17);
        assert_eq!(policy.block_for(1, reset, WINDOW), reset);
    }

    #[test]
    fn test_repeat_violations_double() {
        let policy = EscalationPolicy::default();
        let reset = Duration::from_secs(10);
        assert_eq!(policy.block_for(2, reset, WINDOW), Duration::from_secs(120));
        assert_eq!(policy.block_for(3, reset, WINDOW), Duration::from_secs(240));
        assert_eq!(policy.block_for(4, reset, WINDOW), Duration::from_secs(480));
    }

    #[test]
    fn test_capped_at_max_block() {
        let policy = EscalationPolicy::default();
        let reset = Duration::from_secs(10);
        assert_eq!(policy.block_for(7, reset, WINDOW), Duration::from_secs(3600));
        assert_eq!(policy.block_for(40, reset, WINDOW), Duration::from_secs(3600));
    }

    #[test]
    fn test_never_shorter_than_window_reset() {
        let policy = EscalationPolicy {
            max_block: Duration::from_secs(30),
            ..EscalationPolicy::default()
        };
        let reset = Duration::from_secs(45);
        assert_eq!(policy.block_for(5, reset, WINDOW), reset);
    }

    #[test]
    fn test_validation() {
        assert!(EscalationPolicy::default().validate().is_ok());
        let policy = EscalationPolicy {
            multiplier: 0,
            ..EscalationPolicy::default()
        };
        assert!(policy.validate().unwrap_err().contains("multiplier"));
    }
}
