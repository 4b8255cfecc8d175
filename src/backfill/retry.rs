//! Retry backoff policy for backfill fetches

use std::time::Duration;

/// Bounded retry with strictly increasing backoff.
///
/// Attempt `n` (1-based) waits `base_delay * n` before the next try, so
/// successive waits always grow.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff to wait after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_strictly_increases() {
        let policy = RetryPolicy::default();
        for attempt in 1..policy.max_attempts {
            assert!(policy.delay_for(attempt + 1) > policy.delay_for(attempt));
        }
    }

    #[test]
    fn test_default_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(5), Duration::from_millis(7500));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        assert_eq!(policy.max_attempts, 1);
    }
}
