// Retry backoff for the handshake driver with exponential growth and jitter
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retrying rounds that failed with a retryable error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of consecutive failed rounds before giving up
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds (backoff cap)
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Jitter factor to avoid thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Backoff state of one handshake attempt
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, failures: 0 }
    }

    /// Consecutive failures recorded since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether another retry is allowed
    pub fn exhausted(&self) -> bool {
        self.failures >= self.config.max_retries
    }

    /// Record a failure and return how long to wait before the next round
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.failures.min(31) as i32;
        self.failures = self.failures.saturating_add(1);

        let base = self.config.initial_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        let base_delay = (base as u64).min(self.config.max_delay_ms);
        let delay = (base_delay + self.calculate_jitter(base_delay)).min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// A successful round starts the schedule over
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Calculate jitter to avoid thundering herd
    pub fn calculate_jitter(&self, base_delay_ms: u64) -> u64 {
        if self.config.jitter_factor <= 0.0 {
            return 0;
        }

        let max_jitter = (base_delay_ms as f64 * self.config.jitter_factor) as u64;
        fastrand::u64(0..=max_jitter)
    }
}
