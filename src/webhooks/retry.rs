// Exponential backoff retry logic for webhook delivery
//
// Implements retry strategy with:
// - Exponential backoff (2s, 4s after the first and second failures)
// - Maximum 3 attempts including the first
// - Optional jitter to prevent thundering herd
// - Fixed timeout per attempt

use serde::{Deserialize, Serialize};
use std::time::Duration;
use rand::Rng;
use tracing::debug;

/// Retry strategy configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first (default 3)
    pub max_attempts: u32,
    /// Base delay in milliseconds (default 1000ms)
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay (default 60000ms)
    pub max_delay_ms: u64,
    /// Per-attempt request timeout in seconds (default 10s)
    pub attempt_timeout_secs: u64,
    /// Add ±20% jitter to delays (default false)
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
            attempt_timeout_secs: 10,
            use_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Per-attempt request timeout
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// Retry decision for a failed delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// Attempt budget exhausted
    GiveUp,
}

/// Decide what follows a failed attempt
///
/// Formula: delay = min(base * 2^attempt, max_delay) (+ jitter)
///
/// # Arguments
/// * `attempt` - One-indexed number of the attempt that just failed
/// * `config` - Retry configuration
pub fn next_retry(attempt: u32, config: &RetryConfig) -> RetryDecision {
    if attempt >= config.max_attempts {
        debug!("Max attempts ({}) reached, giving up", config.max_attempts);
        return RetryDecision::GiveUp;
    }

    let delay_ms = config
        .base_delay_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(config.max_delay_ms);

    let delay_ms = if config.use_jitter && delay_ms > 0 {
        let jitter = delay_ms / 5;
        let mut rng = rand::rng();
        let offset = rng.random_range(0..=jitter);
        if rng.random_bool(0.5) {
            delay_ms.saturating_add(offset)
        } else {
            delay_ms.saturating_sub(offset)
        }
    } else {
        delay_ms
    };

    debug!("Attempt {} failed - next try in {} ms", attempt, delay_ms);

    RetryDecision::Retry(Duration::from_millis(delay_ms))
}
