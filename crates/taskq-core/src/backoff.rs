use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// Used for delaying re-enqueues of failed tasks and for retrying
/// transient broker and persistence errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Delay before the first retry, in milliseconds.
    pub initial_interval_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_interval_ms: u64,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Randomness applied to each delay, 0.0 to 1.0 (0.25 = +/-25%).
    pub jitter_percent: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            max_interval_ms: 10_000,
            multiplier: 2.0,
            jitter_percent: 0.25,
        }
    }
}

impl Backoff {
    pub fn new(initial_interval_ms: u64, max_interval_ms: u64, multiplier: f64, jitter_percent: f64) -> Self {
        Self {
            initial_interval_ms,
            max_interval_ms,
            multiplier,
            jitter_percent: jitter_percent.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped_ms = self.capped_ms(attempt);
        let jitter = self.jitter_percent.abs().min(1.0);
        let factor = if jitter == 0.0 {
            1.0
        } else {
            1.0 + rand::thread_rng().gen_range(-jitter..=jitter)
        };
        Duration::from_millis(to_millis(capped_ms * factor))
    }

    /// Same as [`Backoff::delay`] with the jitter removed.
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        Duration::from_millis(to_millis(self.capped_ms(attempt)))
    }

    fn capped_ms(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_interval_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        base.min(self.max_interval_ms as f64)
    }
}

fn to_millis(ms: f64) -> u64 {
    if ms.is_nan() || ms <= 0.0 {
        0
    } else if ms >= u64::MAX as f64 {
        u64::MAX
    } else {
        ms as u64
    }
}
