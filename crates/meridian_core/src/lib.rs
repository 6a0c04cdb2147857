//! Core infrastructure shared by the Meridian crates.
//!
//! - [`Clock`] - Time provider consulted by stateful components, mockable for testing
//! - [`TracingConfig`] - `tracing` subscriber configuration and installation

/// Time provider and mock clock.
pub mod time;

/// Tracing subscriber configuration.
pub mod tracing_setup;

pub use time::{Clock, ClockProvider};
#[cfg(any(test, feature = "test-utils"))]
pub use time::MockClock;
pub use tracing_setup::{TracingConfig, TracingFormat};
