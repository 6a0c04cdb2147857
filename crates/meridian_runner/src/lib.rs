//! Node execution for Meridian plans.
//!
//! This crate turns an unreliable async work function into a well-behaved
//! plan node:
//!
//! - [`NodeRunner`] enforces a per-attempt timeout, retries retryable
//!   failures with exponential [`backoff`], consults a per-node circuit
//!   breaker ([`CircuitBreakerRegistry`]) and honors a shared
//!   [`CancellationSignal`].
//! - [`PlanScheduler`] runs a dependency-ordered [`Plan`] through a runner
//!   with bounded concurrency.
//! - [`hooks`] and [`NodeMetricsCollector`] observe what happens.
//!
//! # Example
//!
//! ```
//! use meridian_errors::NodeError;
//! use meridian_runner::{CancellationSignal, NodeRunner, RunnerConfig};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let runner = NodeRunner::new(RunnerConfig::simple())?;
//! let signal = CancellationSignal::new();
//!
//! let answer = runner
//!     .run("answer", &signal, || async { Ok::<_, NodeError>(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

pub mod backoff;
pub mod breaker;
pub mod cancel;
pub mod config;
pub mod hooks;
pub mod metrics;
pub mod plan;
pub mod runner;
pub mod scheduler;

pub use backoff::{BackoffPolicy, compute_delay};
pub use breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitPermit, CircuitSnapshot, CircuitState,
};
pub use cancel::CancellationSignal;
pub use config::{ConfigError, RunnerConfig};
pub use hooks::{HookRegistrationError, RunnerEvent, RunnerEventKind, RunnerHooks};
pub use metrics::{MetricsConfig, MetricsErrorCategory, NodeMetrics, NodeMetricsCollector};
pub use plan::{Plan, PlanError, PlanNode};
pub use runner::{NodeRunner, RunOptions};
pub use scheduler::{NodeStatus, PlanReport, PlanScheduler};
