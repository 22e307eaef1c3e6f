use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default multiplier applied between consecutive attempts.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Computes the delay before retry number `attempt`.
///
/// `attempt` starts at 1 for the first retry; the original attempt is not a
/// retry. The result is `min(base_ms * multiplier^(attempt - 1), max_ms)`.
/// An `attempt` of 0 is treated as 1 and any overflow saturates at `max_ms`.
pub fn compute_delay(attempt: u32, base_ms: u64, max_ms: u64, multiplier: f64) -> u64 {
    let exponent = attempt.max(1) - 1;
    let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
    let raw = base_ms as f64 * multiplier.powi(exponent);

    if !raw.is_finite() || raw >= max_ms as f64 {
        return max_ms;
    }

    // negative multipliers make no sense for a delay
    if raw <= 0.0 {
        return 0;
    }

    raw as u64
}

/// Exponential backoff parameters with a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max,
            multiplier: DEFAULT_MULTIPLIER,
            max_retries,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    #[inline]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(compute_delay(
            attempt,
            duration_millis(self.base),
            duration_millis(self.max),
            self.multiplier,
        ))
    }

    /// Whether another retry is allowed after `past_retries` retries.
    #[inline]
    pub fn allows(&self, past_retries: u32) -> bool {
        past_retries < self.max_retries
    }
}

#[inline]
fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
