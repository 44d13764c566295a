//! Retry policy: decides attempt caps, backoff delays and timeout scope.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for failed attempts.
///
/// Delays are kept as milliseconds so the policy reads naturally from config
/// files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for the backoff.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Run exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Is another attempt allowed after `attempts` have been made?
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the retry that follows the `attempts`-th failure.
    ///
    /// delay = base_delay * multiplier^attempts, capped at `max_delay`.
    ///
    /// Example with base_delay=100ms, multiplier=2.0:
    /// - after attempt 1: 200ms
    /// - after attempt 2: 400ms
    /// - after attempt 3: 800ms
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(i32::MAX as u32) as i32;
        let secs = self.base_delay().as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay())
    }
}

/// Scope of a task's timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Every attempt gets a fresh window of the full timeout.
    #[default]
    PerAttempt,

    /// The timeout is one budget shared by all attempts and backoffs.
    Total,
}
