//! Node execution runner for dependency-graph plan orchestration.
//!
//! Runs each plan node with a per-attempt timeout, cooperative cancellation,
//! classified retries with jittered exponential backoff, and a per-node
//! circuit breaker. See [`meridian_runner`] for the runner itself.

pub use meridian_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_internal::prelude::*;
}
