//! Error classification.
//!
//! [`classify_error`] maps a [`NodeError`] to an [`ErrorClassification`]:
//! a diagnostic category plus the action the runner should take. The first
//! matching rule wins:
//!
//! | Rule | Category | Retryable | Action |
//! |------|----------|-----------|--------|
//! | [`NodeError::Validation`] | `validation` | no | fail |
//! | [`NodeError::Programming`] | `programming` | no | fail |
//! | [`NodeError::Timeout`] | `timeout` | yes | retry |
//! | [`NodeError::Cancelled`] | `cancellation` | no | cancel |
//! | [`NodeError::CircuitOpen`] | `circuit_open` | no | fail |
//! | [`NodeError::Network`] or network message | `network` | yes | retry |
//! | [`NodeError::RateLimited`] or rate-limit message | `rate_limit` | yes | retry |
//! | anything else | `unknown` | yes | retry |

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Message fragments that identify transport failures.
const NETWORK_PATTERNS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "enotfound",
    "fetch failed",
    "network error",
    "socket hang up",
];

/// Message fragments that identify upstream throttling.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "quota exceeded",
    "throttled",
];

/// Diagnostic category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input or schema validation failure.
    Validation,
    /// Bug in the work function.
    Programming,
    /// Per-attempt timeout.
    Timeout,
    /// Plan-run cancellation.
    Cancellation,
    /// Rejected by an open circuit breaker.
    CircuitOpen,
    /// Transport-level failure.
    Network,
    /// Upstream throttling.
    RateLimit,
    /// Unrecognized failure, presumed transient.
    Unknown,
}

impl ErrorCategory {
    /// Returns the snake-case name of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Programming => "programming",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Cancellation => "cancellation",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Network => "network",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scheduler should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Try the node again after a backoff delay.
    Retry,
    /// Give up on the node.
    Fail,
    /// Stop the node; the plan run is being cancelled.
    Cancel,
}

/// Verdict on a single failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClassification {
    /// Diagnostic category.
    pub category: ErrorCategory,
    /// Whether another attempt may succeed.
    pub is_retryable: bool,
    /// What the scheduler should do.
    pub action: RecoveryAction,
    /// Short explanation of the verdict.
    pub reason: String,
}

impl ErrorClassification {
    fn new(category: ErrorCategory, reason: impl Into<String>) -> Self {
        let (is_retryable, action) = match category {
            ErrorCategory::Timeout
            | ErrorCategory::Network
            | ErrorCategory::RateLimit
            | ErrorCategory::Unknown => (true, RecoveryAction::Retry),
            ErrorCategory::Cancellation => (false, RecoveryAction::Cancel),
            ErrorCategory::Validation | ErrorCategory::Programming | ErrorCategory::CircuitOpen => {
                (false, RecoveryAction::Fail)
            }
        };
        Self {
            category,
            is_retryable,
            action,
            reason: reason.into(),
        }
    }

    fn unknown() -> Self {
        Self::new(
            ErrorCategory::Unknown,
            "unrecognized error, assuming transient",
        )
    }
}

/// Classifies a failure.
#[must_use]
pub fn classify_error(err: &NodeError) -> ErrorClassification {
    match err {
        NodeError::Validation(v) => ErrorClassification::new(
            ErrorCategory::Validation,
            format!("validation failed with {} issue(s)", v.issues.len()),
        ),
        NodeError::Programming { kind, .. } => ErrorClassification::new(
            ErrorCategory::Programming,
            format!("programming error ({kind})"),
        ),
        NodeError::Timeout { timeout, .. } => ErrorClassification::new(
            ErrorCategory::Timeout,
            format!("attempt exceeded {}ms", timeout.as_millis()),
        ),
        NodeError::Cancelled { .. } => {
            ErrorClassification::new(ErrorCategory::Cancellation, "plan run was cancelled")
        }
        NodeError::CircuitOpen { .. } => {
            ErrorClassification::new(ErrorCategory::CircuitOpen, "circuit breaker is open")
        }
        NodeError::Network { .. } => {
            ErrorClassification::new(ErrorCategory::Network, "structured network error")
        }
        NodeError::RateLimited { .. } => {
            ErrorClassification::new(ErrorCategory::RateLimit, "structured rate-limit error")
        }
        // The wrapper's own text names the node, so only the cause counts.
        NodeError::RetryExhausted { last_error, .. } => classify_error(last_error),
        NodeError::Failed { .. } => classify_message(&err.to_string()),
    }
}

/// Classifies a possibly absent failure.
///
/// `None` stands for a failure that carried no value at all and classifies
/// as [`ErrorCategory::Unknown`].
#[must_use]
pub fn classify_optional(err: Option<&NodeError>) -> ErrorClassification {
    match err {
        Some(err) => classify_error(err),
        None => ErrorClassification::unknown(),
    }
}

/// Returns whether a failure may succeed on another attempt.
///
/// Always agrees with `classify_error(err).is_retryable`.
#[must_use]
pub fn is_retryable_node_error(err: &NodeError) -> bool {
    classify_error(err).is_retryable
}

/// Heuristic fallback for failures without a structured code.
///
/// Substring matching on messages is a compatibility boundary: callers that
/// can report [`NodeError::Network`] or [`NodeError::RateLimited`] directly
/// bypass it entirely.
fn classify_message(message: &str) -> ErrorClassification {
    let lower = message.to_lowercase();

    if let Some(pattern) = NETWORK_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return ErrorClassification::new(
            ErrorCategory::Network,
            format!("message matched network pattern '{pattern}'"),
        );
    }

    if let Some(pattern) = RATE_LIMIT_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return ErrorClassification::new(
            ErrorCategory::RateLimit,
            format!("message matched rate-limit pattern '{pattern}'"),
        );
    }

    ErrorClassification::unknown()
}
