//! Dispatcher defaults shared by every provider

use crate::dispatcher::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings applied to every dispatcher unless a provider overrides them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherDefaults {
    /// Longest a request waits for its batch to fill, in seconds
    pub flush_interval_secs: u64,

    /// Requests buffered ahead of the dispatcher before submitters wait
    pub intake_capacity: usize,

    /// Provider calls a single dispatcher may have in flight
    pub max_concurrent_batches: usize,

    /// Resubmission policy for failed provider calls
    pub retry: RetryConfig,
}

impl Default for DispatcherDefaults {
    fn default() -> Self {
        Self {
            flush_interval_secs: 5,
            intake_capacity: 1024,
            max_concurrent_batches: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Serializable form of [`RetryPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Provider calls a request may take part in before it is failed
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter: policy.jitter,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}
