//! Reconnect backoff policy.
//!
//! Delay for attempt `n` (zero-based) is `min(base_delay * 2^n, max_delay)`.
//! With the defaults that is 1s, 2s, 4s, 8s, 16s, then 30s for every later
//! attempt, for at most 10 attempts.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for any reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up.
    pub max_attempts: u32,

    /// Delay before the first attempt.
    #[serde(with = "crate::config::serde_millis")]
    pub base_delay: Duration,

    /// Cap applied to every delay.
    #[serde(with = "crate::config::serde_millis")]
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Returns the delay before attempt number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns `true` if another attempt may be scheduled after
    /// `attempts` have already fired.
    #[inline]
    #[must_use]
    pub const fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..10)
            .map(|n| policy.delay_for_attempt(n).as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_allows_up_to_max() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(9));
        assert!(!policy.allows(10));
        assert!(!policy.allows(11));
    }

    #[test]
    fn test_huge_attempt_clamps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(31), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for_attempt(32), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for_attempt(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn test_zero_attempts_never_allows() {
        let policy = ReconnectPolicy::new(0, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY);
        assert!(!policy.allows(0));
    }

    proptest! {
        #[test]
        fn prop_delay_matches_formula(attempt in 0u32..10) {
            let expected = (1000u64 << attempt).min(30_000);
            let delay = ReconnectPolicy::default().delay_for_attempt(attempt);
            prop_assert_eq!(delay, Duration::from_millis(expected));
        }

        #[test]
        fn prop_delay_is_monotonic_and_capped(
            attempt in 0u32..64,
            base_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
        ) {
            let policy = ReconnectPolicy::new(
                10,
                Duration::from_millis(base_ms),
                Duration::from_millis(base_ms + extra_ms),
            );
            let current = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= policy.max_delay);
            prop_assert!(current >= policy.base_delay.min(policy.max_delay));
        }
    }
}
