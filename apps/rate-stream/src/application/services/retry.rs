//! Fetch Retry Policy
//!
//! Exponential backoff with jitter for retrying a failed upstream fetch
//! within a single tick. Attempts are bounded so a tick always resolves
//! (to a real or degraded record) well before the next one is due.

use std::time::Duration;

use rand::Rng;

/// Configuration for fetch retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of retries per tick (0 = no retries).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 2,
        }
    }
}

/// Retry policy implementing exponential backoff with jitter.
///
/// Unlike a reconnect policy, exhaustion is not an error here: the
/// caller converts an exhausted tick into a degraded record and moves
/// on to the next tick.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the next delay duration, applying exponential backoff with jitter.
    ///
    /// Returns `None` once the allowed attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        // Scale the delay for subsequent attempts, capped at max_delay
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay_with_jitter)
    }

    /// Reset the policy after a successful fetch.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
