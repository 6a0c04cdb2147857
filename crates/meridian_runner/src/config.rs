//! Runner configuration.
//!
//! [`RunnerConfig`] is plain data so it can be loaded from JSON or any other
//! serde format. Durations are stored as milliseconds to keep that form
//! readable; the typed accessors convert them.

use core::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::breaker::CircuitBreakerConfig;

/// Invalid runner or scheduler configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A node timeout of zero would fail every attempt.
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    /// Jitter must lie in `[0, 1)`.
    #[error("jitter factor must be in [0, 1), got {0}")]
    InvalidJitter(f64),
    /// A breaker that opens after zero failures never admits a call.
    #[error("circuit breaker failure threshold must be at least 1")]
    ZeroFailureThreshold,
    /// The scheduler needs at least one slot.
    #[error("max concurrency must be at least 1")]
    ZeroConcurrency,
    /// The metrics window needs at least one sample.
    #[error("metrics window size must be at least 1")]
    ZeroWindow,
    /// A failure-rate threshold must be a fraction.
    #[error("failure rate threshold must be in [0, 1], got {0}")]
    InvalidFailureRate(f64),
}

/// Settings for a [`NodeRunner`](crate::NodeRunner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Per-attempt deadline.
    pub timeout_ms: u64,
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_backoff_ms: u64,
    /// Relative jitter around each backoff delay.
    pub jitter_factor: f64,
    /// Consecutive failures before a node's circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a trial.
    pub recovery_time_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            base_backoff_ms: 1_000,
            jitter_factor: crate::backoff::DEFAULT_JITTER_FACTOR,
            failure_threshold: 5,
            recovery_time_ms: 60_000,
        }
    }
}

impl RunnerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Short deterministic steps: 10s timeout, two retries, fast backoff.
    #[must_use]
    pub fn simple() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 2,
            base_backoff_ms: 500,
            ..Self::default()
        }
    }

    /// Model calls: long timeout and a patient breaker.
    #[must_use]
    pub fn llm() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 3,
            base_backoff_ms: 2_000,
            failure_threshold: 5,
            recovery_time_ms: 60_000,
            ..Self::default()
        }
    }

    /// External tools: moderate timeout, trips quickly.
    #[must_use]
    pub fn tool() -> Self {
        Self {
            timeout_ms: 60_000,
            max_retries: 2,
            base_backoff_ms: 1_000,
            failure_threshold: 3,
            recovery_time_ms: 30_000,
            ..Self::default()
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_millis(timeout);
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff_ms = duration_millis(base);
        self
    }

    /// Sets the backoff jitter.
    #[must_use]
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Sets the breaker threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the breaker recovery time.
    #[must_use]
    pub fn with_recovery_time(mut self, recovery: Duration) -> Self {
        self.recovery_time_ms = duration_millis(recovery);
        self
    }

    /// Checks the configuration for values the runner cannot honor.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff policy built from the base delay and jitter.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(self.base_backoff_ms))
            .with_jitter_factor(self.jitter_factor)
    }

    /// Breaker settings.
    #[must_use]
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_time: Duration::from_millis(self.recovery_time_ms),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
