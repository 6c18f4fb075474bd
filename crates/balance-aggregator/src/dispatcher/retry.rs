//! # Resubmission Backoff
//!
//! Failed batches are not retried in place. Each request is handed back to
//! its dispatcher after an exponentially growing delay until it has taken
//! part in `max_attempts` provider calls, then it is failed.

use rand::Rng;
use std::time::Duration;

/// Retry ceiling and backoff curve for failed provider calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Whether a request that has failed `attempts` times may be resubmitted
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before resubmitting a request that has failed `attempts` times
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_millis() as f64;
        let calculated = base_delay * self.backoff_multiplier.powi(exponent);

        // Cap at max_delay
        let capped = calculated.min(self.max_delay.as_millis() as f64);
        let delay = Duration::from_millis(capped.max(0.0) as u64);

        if self.jitter {
            Self::add_jitter(delay)
        } else {
            delay
        }
    }

    /// Adds up to 25% random jitter so retries from many batches spread out
    fn add_jitter(delay: Duration) -> Duration {
        let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
        delay + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = policy(false);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(50), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy(true);
        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_ceiling() {
        let policy = policy(false);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }
}
