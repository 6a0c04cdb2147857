//! Exponential backoff with jitter.
//!
//! The delay before retry `n` (zero-based) is `base * 2^n`, scaled by a
//! uniformly chosen factor in `[1 - jitter, 1 + jitter]` and floored to whole
//! milliseconds. With the defaults the first three retries wait roughly one,
//! two and four seconds, each within ±20%.

use core::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Base delay used when none is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Relative jitter applied around the nominal delay.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Computes retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base_delay: Duration,
    jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY)
    }
}

impl BackoffPolicy {
    /// Creates a policy with the default jitter.
    #[must_use]
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Sets the jitter factor, clamped to `[0, 1)`.
    #[must_use]
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = if jitter_factor.is_finite() {
            jitter_factor.clamp(0.0, 0.99)
        } else {
            0.0
        };
        self
    }

    /// Disables jitter; every delay equals its nominal value.
    #[must_use]
    pub fn without_jitter(self) -> Self {
        self.with_jitter_factor(0.0)
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the jitter factor.
    #[must_use]
    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Returns `base * 2^attempt` in milliseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn nominal_millis(&self, attempt: u32) -> u64 {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        2_u64
            .checked_pow(attempt)
            .map_or(u64::MAX, |factor| base.saturating_mul(factor))
    }

    /// Returns the jittered delay before retry `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Like [`delay_for`](Self::delay_for) with a caller-supplied random source.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_millis(attempt);
        let spread = (nominal as f64 * self.jitter_factor).floor() as u64;
        if spread == 0 {
            return Duration::from_millis(nominal);
        }
        let low = nominal.saturating_sub(spread);
        let high = nominal.saturating_add(spread);
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

/// Delay before retry `attempt` using the default jitter.
#[must_use]
pub fn compute_delay(attempt: u32, base_delay: Duration) -> Duration {
    BackoffPolicy::new(base_delay).delay_for(attempt)
}
