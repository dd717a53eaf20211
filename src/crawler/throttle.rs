//! Pacing between page loads and backoff for rate-limited requests

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Randomized delay between consecutive pages of a session
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    min_ms: u64,
    max_ms: u64,
}

impl Throttle {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.min_delay_ms, config.max_delay_ms)
    }

    /// Picks a delay uniformly from the configured bounds
    pub fn next_delay(&self) -> Duration {
        if self.max_ms == self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    /// Sleeps for a randomized delay and returns how long it waited
    pub async fn wait(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!("Waiting {}ms before next page", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

/// Exponential backoff for rate-limited requests
#[derive(Debug, Clone, Copy)]
pub struct RetryBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl RetryBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.backoff_base_ms, config.backoff_max_ms)
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    /// Delay before retry number `attempt` (0-based), capped at the maximum plus jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)))
            .min(self.max_ms);

        let jitter = if self.jitter_percent > 0 && capped > 0 {
            rand::rng().random_range(0..=capped * self.jitter_percent / 100)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}
