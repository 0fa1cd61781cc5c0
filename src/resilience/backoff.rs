//! Exponential backoff with jitter for gateway retries.

use std::time::Duration;

use rand::Rng;

use crate::config::NetworkOptions;

/// Retry schedule: `base * 2^(attempt-1)`, capped, plus up to 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn from_options(options: &NetworkOptions) -> Self {
        Self {
            base_ms: options.base_delay_ms,
            max_ms: options.max_delay_ms,
            max_attempts: options.max_attempts.max(1),
        }
    }

    /// Delay before retrying after `attempt` failed attempts, or `None` once
    /// the attempts are used up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let capped = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1))
            .min(self.max_ms);

        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        Some(Duration::from_millis(capped + jitter))
    }
}
