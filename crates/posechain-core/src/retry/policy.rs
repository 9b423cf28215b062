//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for remote calls.
///
/// Backoff is linear in the attempt number with a hard cap:
///
/// ```text
/// delay(n) = min(base_delay * (1 + n * multiplier) + uniform(0..=jitter), max_delay)
/// ```
///
/// where `n` is the 1-based number of the attempt that just failed.
///
/// Example with the default policy (base 60s, multiplier 0.5, cap 300s):
/// - attempt 1 fails: 90s (+ jitter)
/// - attempt 2 fails: 120s
/// - attempt 3 fails: 150s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means "try once".
    pub max_retries: u32,

    pub base_delay: Duration,

    /// Growth per attempt, as a fraction of `base_delay`.
    pub multiplier: f64,

    pub max_delay: Duration,

    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            multiplier: 0.5,
            max_delay: Duration::from_secs(300),
            jitter: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, `max_retries` times.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            multiplier: 0.0,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic part of the delay after attempt `attempt` failed.
    ///
    /// A delay too large for `Duration` (or NaN) falls back to `max_delay`.
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        let factor = 1.0 + f64::from(attempt) * self.multiplier.max(0.0);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// `multiplier` must be a finite, non-negative number.
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(format!(
                "retry multiplier must be finite and non-negative, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }

    /// Delay after attempt `attempt` (1-based) failed, jitter included.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        (self.delay_without_jitter(attempt) + jitter).min(self.max_delay)
    }
}
