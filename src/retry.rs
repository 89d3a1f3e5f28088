//! Bounded-retry configuration for status writes.
//!
//! Status writes against the external API server can fail on its
//! optimistic-concurrency check when another writer got there first. The
//! reconciler absorbs those races by re-running the whole fetch/compute/write
//! cycle a small, fixed number of times, sleeping one jittered backoff slot
//! between attempts. This module owns the attempt cap and the delay math; the
//! loop itself lives with the reconciler so each attempt sees fresh state.

use std::time::Duration;

use rand::Rng;

use crate::STATUS_WRITE_ATTEMPTS;

/// Configuration for the bounded status-write retry loop.
///
/// Delays use exponential backoff with jitter to avoid thundering herd when
/// many watch events collide on the same external resource.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total write attempts per target, including the first (never 0)
    pub max_attempts: u32,
    /// Delay slot after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay slot
    pub max_delay: Duration,
    /// Multiplier applied per subsequent attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: STATUS_WRITE_ATTEMPTS,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a specific attempt cap
    ///
    /// An `attempts` of 0 is clamped to 1: the first attempt always runs.
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay slot to sleep after the given failed attempt (1-based).
    ///
    /// Exponential in the attempt number, capped at `max_delay`, then
    /// jittered to 0.5x-1.5x so concurrent retriers spread out.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_write_attempt_cap() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, STATUS_WRITE_ATTEMPTS);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let config = RetryConfig::with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_delay_grows_with_attempts() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        };

        // Jitter is 0.5x-1.5x, so attempt 3 (base 400ms) always exceeds
        // attempt 1's ceiling (150ms).
        let first = config.delay_for(1);
        let third = config.delay_for(3);
        assert!(first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(200));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };

        for attempt in 1..=10 {
            let delay = config.delay_for(attempt);
            // max_delay plus the 1.5x jitter ceiling
            assert!(delay <= Duration::from_millis(750), "attempt {}", attempt);
        }
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = config.delay_for(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
