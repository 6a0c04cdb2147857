//! # Meridian Internal Library
//!
//! Re-exports the core Meridian crates for convenience.

/// Clock abstraction and tracing setup.
pub use meridian_core;

/// Node error taxonomy, classification and reports.
pub use meridian_errors;

/// Surface vocabulary normalization.
pub use meridian_surface;

/// Node execution: retries, timeouts, cancellation, circuit breaking.
pub use meridian_runner;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_core::{Clock, ClockProvider, TracingConfig, TracingFormat};
    pub use meridian_errors::{
        ErrorCategory, ErrorClassification, ErrorReport, NodeError, RecoveryAction,
        ValidationError, classify_error,
    };
    pub use meridian_runner::{
        BackoffPolicy, CancellationSignal, CircuitBreakerRegistry, CircuitState,
        NodeMetricsCollector, NodeRunner, NodeStatus, Plan, PlanNode, PlanReport, PlanScheduler,
        RunOptions, RunnerConfig, RunnerEvent, RunnerEventKind, RunnerHooks,
    };
    pub use meridian_surface::{ScopeTouches, Surface, SurfaceNormalizer};
}
