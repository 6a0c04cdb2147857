//! Lifecycle hooks for node execution.
//!
//! The runner reports every step of a node invocation (attempt start,
//! failure, scheduled retry, timeout, circuit rejection and the terminal
//! outcome) as a [`RunnerEvent`]. Observers registered on [`RunnerHooks`]
//! receive those events synchronously, in registration order.
//!
//! Hooks are keyed by [`RunnerEventKind`], so an observer only pays for the
//! events it asked for.
//!
//! # Example
//!
//! ```
//! use meridian_runner::hooks::{RunnerEvent, RunnerEventKind, RunnerHooks};
//!
//! let hooks = RunnerHooks::new();
//! hooks
//!     .register_observer_for(&[RunnerEventKind::RetryScheduled], "retry-log", |event| {
//!         if let RunnerEvent::RetryScheduled { node_name, delay, .. } = event {
//!             tracing::info!(node = %node_name, ?delay, "retrying");
//!         }
//!     })
//!     .unwrap();
//! assert_eq!(hooks.hook_count(RunnerEventKind::RetryScheduled), 1);
//! ```

pub mod api;
pub mod events;

pub use api::{HookRegistrationError, RunnerHooks};
pub use events::{RunnerEvent, RunnerEventKind};
