use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound of the jitter factor.
pub const JITTER_MIN: f64 = 0.85;
/// Upper bound of the jitter factor.
pub const JITTER_MAX: f64 = 1.15;

/// Exponential backoff with multiplicative jitter.
///
/// The delay for attempt `k` is `base_ms * 2^k`, capped at `max_ms`, then
/// multiplied by a uniform factor in `[0.85, 1.15]`. The jittered value is
/// clamped to `[1, max_ms]` so a delay is always positive and never exceeds
/// the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay of attempt 0 before jitter.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Hard cap on any delay.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_base_ms() -> u64 {
    10_000
}

fn default_max_ms() -> u64 {
    600_000
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Policy with the given base and cap.
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Un-jittered delay: `base_ms * 2^attempt` capped at `max_ms`.
    /// Negative attempts count as attempt 0.
    pub fn capped_ms(&self, attempt: i64) -> u64 {
        let attempt = attempt.clamp(0, i64::from(u32::MAX)) as u32;
        self.base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_ms)
    }

    /// Jittered delay in milliseconds for the given attempt.
    pub fn delay_ms(&self, attempt: i64) -> u64 {
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.delay_ms_with_factor(attempt, factor)
    }

    /// Same as [`delay_ms`](Self::delay_ms) with an explicit jitter factor.
    /// Factors outside `[0.85, 1.15]` are clamped into it.
    pub fn delay_ms_with_factor(&self, attempt: i64, factor: f64) -> u64 {
        let factor = if factor.is_nan() {
            1.0
        } else {
            factor.clamp(JITTER_MIN, JITTER_MAX)
        };
        let jittered = (self.capped_ms(attempt) as f64 * factor).round() as u64;
        jittered.min(self.max_ms).max(1)
    }

    /// Jittered delay as a [`Duration`].
    pub fn delay(&self, attempt: i64) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}
