//! Events emitted while a node runs.

use core::fmt;
use core::time::Duration;

use meridian_errors::{ErrorClassification, ErrorReport};

/// One step of a node invocation.
///
/// Attempt numbers are zero-based: the first attempt is `0`.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// An attempt is about to call the work function.
    AttemptStarted {
        /// Node being run.
        node_name: String,
        /// Attempt number.
        attempt: u32,
    },
    /// An attempt failed; the classification decides what happens next.
    AttemptFailed {
        /// Node being run.
        node_name: String,
        /// Attempt number.
        attempt: u32,
        /// Failure message.
        error: String,
        /// Classifier verdict for the failure.
        classification: ErrorClassification,
    },
    /// The runner will sleep and try again.
    RetryScheduled {
        /// Node being run.
        node_name: String,
        /// Number of the attempt that will run after the delay.
        attempt: u32,
        /// Backoff delay before that attempt.
        delay: Duration,
    },
    /// An attempt exceeded its deadline.
    TimedOut {
        /// Node being run.
        node_name: String,
        /// Attempt number.
        attempt: u32,
        /// The deadline that elapsed.
        timeout: Duration,
    },
    /// The node's circuit is open; the work function was not called.
    CircuitRejected {
        /// Node being run.
        node_name: String,
        /// Failures recorded by the breaker.
        consecutive_failures: u32,
    },
    /// The node completed.
    Succeeded {
        /// Node that ran.
        node_name: String,
        /// Attempts made, including the successful one.
        attempts: u32,
        /// Wall time from the first attempt to completion.
        duration: Duration,
    },
    /// The node failed for good.
    Failed {
        /// Node that ran.
        node_name: String,
        /// Attempts made.
        attempts: u32,
        /// Diagnostic report of the terminal error.
        report: Box<ErrorReport>,
    },
    /// The run was cancelled before the node completed.
    Cancelled {
        /// Node that was running.
        node_name: String,
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

impl RunnerEvent {
    /// Returns the event's kind.
    #[must_use]
    pub fn kind(&self) -> RunnerEventKind {
        match self {
            Self::AttemptStarted { .. } => RunnerEventKind::AttemptStarted,
            Self::AttemptFailed { .. } => RunnerEventKind::AttemptFailed,
            Self::RetryScheduled { .. } => RunnerEventKind::RetryScheduled,
            Self::TimedOut { .. } => RunnerEventKind::TimedOut,
            Self::CircuitRejected { .. } => RunnerEventKind::CircuitRejected,
            Self::Succeeded { .. } => RunnerEventKind::Succeeded,
            Self::Failed { .. } => RunnerEventKind::Failed,
            Self::Cancelled { .. } => RunnerEventKind::Cancelled,
        }
    }

    /// Returns the node the event belongs to.
    #[must_use]
    pub fn node_name(&self) -> &str {
        match self {
            Self::AttemptStarted { node_name, .. }
            | Self::AttemptFailed { node_name, .. }
            | Self::RetryScheduled { node_name, .. }
            | Self::TimedOut { node_name, .. }
            | Self::CircuitRejected { node_name, .. }
            | Self::Succeeded { node_name, .. }
            | Self::Failed { node_name, .. }
            | Self::Cancelled { node_name, .. } => node_name,
        }
    }

    /// Returns `true` for events that end an invocation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            RunnerEventKind::Succeeded
                | RunnerEventKind::Failed
                | RunnerEventKind::Cancelled
                | RunnerEventKind::CircuitRejected
        )
    }
}

/// Discriminant of [`RunnerEvent`], used to key hook registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunnerEventKind {
    /// See [`RunnerEvent::AttemptStarted`].
    AttemptStarted,
    /// See [`RunnerEvent::AttemptFailed`].
    AttemptFailed,
    /// See [`RunnerEvent::RetryScheduled`].
    RetryScheduled,
    /// See [`RunnerEvent::TimedOut`].
    TimedOut,
    /// See [`RunnerEvent::CircuitRejected`].
    CircuitRejected,
    /// See [`RunnerEvent::Succeeded`].
    Succeeded,
    /// See [`RunnerEvent::Failed`].
    Failed,
    /// See [`RunnerEvent::Cancelled`].
    Cancelled,
}

impl RunnerEventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::AttemptStarted,
        Self::AttemptFailed,
        Self::RetryScheduled,
        Self::TimedOut,
        Self::CircuitRejected,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttemptStarted => "attempt_started",
            Self::AttemptFailed => "attempt_failed",
            Self::RetryScheduled => "retry_scheduled",
            Self::TimedOut => "timed_out",
            Self::CircuitRejected => "circuit_rejected",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunnerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
