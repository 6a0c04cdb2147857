//! Per-node circuit breakers.
//!
//! Each node name gets its own breaker, created the first time that node
//! fails. A breaker moves through three states:
//!
//! - `Closed`: calls pass; consecutive failures are counted.
//! - `Open`: calls are rejected with [`NodeError::CircuitOpen`] until the
//!   recovery time has elapsed since the circuit opened.
//! - `HalfOpen`: exactly one trial call is admitted. Success closes the
//!   circuit, failure reopens it with a fresh recovery window.
//!
//! The `Open -> HalfOpen` transition is evaluated lazily when the next call
//! asks for admission; there is no background timer.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use meridian_core::Clock;
use meridian_errors::NodeError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a trial.
    pub recovery_time: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_time: Duration::from_secs(60),
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass.
    Closed,
    /// Calls are rejected.
    Open,
    /// One trial call is admitted.
    HalfOpen,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitSnapshot {
    /// Stored state. An open circuit whose recovery time has elapsed still
    /// reports `Open` until a call asks for admission.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the circuit last opened.
    pub opened_at: Option<Instant>,
    /// Whether a half-open trial is currently running.
    pub trial_in_flight: bool,
    /// Thresholds in effect for this node.
    pub config: CircuitBreakerConfig,
}

#[derive(Debug)]
struct BreakerEntry {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    config: CircuitBreakerConfig,
}

impl BreakerEntry {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            config,
        }
    }

    fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            trial_in_flight: self.trial_in_flight,
            config: self.config,
        }
    }

    fn rejection(&self, node_name: &str) -> NodeError {
        NodeError::CircuitOpen {
            node_name: node_name.to_string(),
            consecutive_failures: self.consecutive_failures,
            recovery_time: self.config.recovery_time,
        }
    }
}

/// Admission granted by [`CircuitBreakerRegistry::acquire`].
///
/// A trial permit marks the half-open trial as running. Dropping it without
/// recording an outcome (for example because the node was cancelled) frees
/// the trial slot so the next caller can try again.
#[derive(Debug)]
#[must_use = "dropping a trial permit immediately releases the trial slot"]
pub struct CircuitPermit {
    trial: Option<Arc<Mutex<BreakerEntry>>>,
}

impl CircuitPermit {
    /// Returns `true` if this permit admits the half-open trial.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if let Some(entry) = self.trial.take() {
            let mut entry = entry.lock();
            if entry.state == CircuitState::HalfOpen {
                entry.trial_in_flight = false;
            }
        }
    }
}

/// Breakers for every node of a run, keyed by node name.
///
/// Share one registry (behind an `Arc`) between everything that should see
/// the same breaker state. Entries are locked individually, so nodes never
/// contend on each other's breakers.
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: RwLock<HashMap<String, CircuitBreakerConfig>>,
    entries: RwLock<HashMap<String, Arc<Mutex<BreakerEntry>>>>,
    clock: Clock,
}

impl core::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("defaults", &self.defaults)
            .field("tracked", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Creates a registry using the system clock.
    #[must_use]
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self::with_clock(defaults, Clock::system())
    }

    /// Creates a registry reading time from `clock`.
    #[must_use]
    pub fn with_clock(defaults: CircuitBreakerConfig, clock: Clock) -> Self {
        Self {
            defaults,
            overrides: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Uses different thresholds for one node.
    pub fn configure(&self, node_name: impl Into<String>, config: CircuitBreakerConfig) {
        let node_name = node_name.into();
        if let Some(entry) = self.entries.read().get(&node_name) {
            entry.lock().config = config;
        }
        self.overrides.write().insert(node_name, config);
    }

    /// Asks whether `node_name` may run now.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::CircuitOpen`] while the circuit is open and its
    /// recovery time has not elapsed, or while another caller holds the
    /// half-open trial.
    pub fn acquire(&self, node_name: &str) -> Result<CircuitPermit, NodeError> {
        let Some(entry) = self.entry(node_name) else {
            return Ok(CircuitPermit { trial: None });
        };

        let mut guard = entry.lock();
        match guard.state {
            CircuitState::Closed => Ok(CircuitPermit { trial: None }),
            CircuitState::Open => {
                let opened_at = guard.opened_at.unwrap_or_else(|| self.clock.now());
                if self.clock.elapsed_since(opened_at) >= guard.config.recovery_time {
                    guard.state = CircuitState::HalfOpen;
                    guard.trial_in_flight = true;
                    tracing::info!(node = node_name, "circuit half-open, admitting trial");
                    drop(guard);
                    Ok(CircuitPermit { trial: Some(entry) })
                } else {
                    Err(guard.rejection(node_name))
                }
            }
            CircuitState::HalfOpen if guard.trial_in_flight => Err(guard.rejection(node_name)),
            CircuitState::HalfOpen => {
                guard.trial_in_flight = true;
                drop(guard);
                Ok(CircuitPermit { trial: Some(entry) })
            }
        }
    }

    /// Records a successful run, closing the circuit.
    pub fn record_success(&self, node_name: &str) {
        let Some(entry) = self.entry(node_name) else {
            return;
        };
        let mut entry = entry.lock();
        if entry.state != CircuitState::Closed {
            tracing::info!(node = node_name, "circuit closed");
        }
        entry.state = CircuitState::Closed;
        entry.consecutive_failures = 0;
        entry.opened_at = None;
        entry.trial_in_flight = false;
    }

    /// Records a terminal failure and returns the resulting state.
    pub fn record_failure(&self, node_name: &str) -> CircuitState {
        let entry = self.entry_or_insert(node_name);
        let mut entry = entry.lock();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);

        let open = match entry.state {
            CircuitState::HalfOpen | CircuitState::Open => true,
            CircuitState::Closed => entry.consecutive_failures >= entry.config.failure_threshold,
        };
        if open {
            if entry.state != CircuitState::Open {
                tracing::warn!(
                    node = node_name,
                    consecutive_failures = entry.consecutive_failures,
                    "circuit opened"
                );
            }
            entry.state = CircuitState::Open;
            entry.opened_at = Some(self.clock.now());
            entry.trial_in_flight = false;
        }
        entry.state
    }

    /// Returns the breaker for `node_name`, if it has ever failed.
    #[must_use]
    pub fn snapshot(&self, node_name: &str) -> Option<CircuitSnapshot> {
        self.entry(node_name).map(|entry| entry.lock().snapshot())
    }

    /// Stored state for `node_name`; `Closed` when untracked.
    #[must_use]
    pub fn state(&self, node_name: &str) -> CircuitState {
        self.snapshot(node_name)
            .map_or(CircuitState::Closed, |snapshot| snapshot.state)
    }

    /// Names of every tracked node.
    #[must_use]
    pub fn tracked_nodes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Forgets the breaker for one node.
    pub fn reset(&self, node_name: &str) {
        self.entries.write().remove(node_name);
    }

    /// Forgets every breaker. Per-node overrides are kept.
    pub fn reset_all(&self) {
        self.entries.write().clear();
    }

    fn entry(&self, node_name: &str) -> Option<Arc<Mutex<BreakerEntry>>> {
        self.entries.read().get(node_name).cloned()
    }

    fn entry_or_insert(&self, node_name: &str) -> Arc<Mutex<BreakerEntry>> {
        if let Some(entry) = self.entry(node_name) {
            return entry;
        }
        let config = self
            .overrides
            .read()
            .get(node_name)
            .copied()
            .unwrap_or(self.defaults);
        Arc::clone(
            self.entries
                .write()
                .entry(node_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new(config)))),
        )
    }
}
