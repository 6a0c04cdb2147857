//! The closed set of node failures.
//!
//! Every failure a work function can raise, and every failure the runner
//! itself produces, is one variant of [`NodeError`]. Work functions convert
//! their own error types into it at the point of failure (see the `From`
//! impls below), so the classifier never has to probe an error's shape.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// A single schema-validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path to the offending field (empty for the document root).
    pub path: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new issue.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Input or schema validation failure carrying every issue found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Issues reported by the validator.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Creates a validation error from a list of issues.
    #[must_use]
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Creates a validation error with a single issue.
    #[must_use]
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue::new(path, message)])
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{issue}")?;
        }
        Ok(())
    }
}

impl core::error::Error for ValidationError {}

// ─────────────────────────────────────────────────────────────────────────────
// Programming
// ─────────────────────────────────────────────────────────────────────────────

/// The flavor of a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammingErrorKind {
    /// The work function panicked.
    Panic,
    /// The work function detected a broken internal invariant.
    InvariantViolation,
}

impl fmt::Display for ProgrammingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgrammingErrorKind::Panic => write!(f, "panic"),
            ProgrammingErrorKind::InvariantViolation => write!(f, "invariant violation"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeError
// ─────────────────────────────────────────────────────────────────────────────

/// Any failure of a node invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    /// Input did not satisfy its schema.
    #[error(transparent)]
    Validation(ValidationError),

    /// A bug in the work function.
    #[error("programming error ({kind}): {message}")]
    Programming {
        /// What kind of programming error occurred.
        kind: ProgrammingErrorKind,
        /// Description or panic payload.
        message: String,
    },

    /// A single attempt exceeded its timeout.
    #[error("node '{node_name}' timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The node that timed out.
        node_name: String,
        /// The per-attempt timeout that was exceeded.
        timeout: Duration,
    },

    /// The plan run's cancellation signal fired.
    #[error("node '{node_name}' was cancelled")]
    Cancelled {
        /// The node that was cancelled.
        node_name: String,
    },

    /// The node's circuit breaker rejected the attempt.
    #[error(
        "circuit open for node '{node_name}' after {consecutive_failures} consecutive failures (recovery {}ms)",
        .recovery_time.as_millis()
    )]
    CircuitOpen {
        /// The node whose breaker is open.
        node_name: String,
        /// Consecutive terminal failures recorded against the node.
        consecutive_failures: u32,
        /// How long the breaker stays open before allowing a trial.
        recovery_time: Duration,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("node '{node_name}' failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// The node that exhausted its retries.
        node_name: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// The failure of the final attempt.
        last_error: Box<NodeError>,
    },

    /// Transport-level failure reported with a structured code.
    #[error("{message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Upstream throttling reported with a structured code.
    #[error("{message}{}", .retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited {
        /// Error message.
        message: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Any other failure. Classified by message.
    #[error("{message}")]
    Failed {
        /// Error message.
        message: String,
        /// The underlying error, if one was wrapped.
        source: Option<Arc<dyn core::error::Error + Send + Sync>>,
    },
}

impl NodeError {
    /// Creates a generic failure from a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error as a generic failure, keeping it as the source.
    #[must_use]
    pub fn wrap<E>(err: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        NodeError::Failed {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Creates a structured network failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        NodeError::Network {
            message: message.into(),
        }
    }

    /// Creates a structured rate-limit failure.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        NodeError::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a programming error flagged by the work function itself.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        NodeError::Programming {
            kind: ProgrammingErrorKind::InvariantViolation,
            message: message.into(),
        }
    }

    /// Creates a programming error from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn core::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "work function panicked".to_string()
        };
        NodeError::Programming {
            kind: ProgrammingErrorKind::Panic,
            message,
        }
    }

    /// Returns the error type name used in serialized reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            NodeError::Validation(_) => "ValidationError",
            NodeError::Programming { .. } => "ProgrammingError",
            NodeError::Timeout { .. } => "NodeTimeoutError",
            NodeError::Cancelled { .. } => "NodeCancellationError",
            NodeError::CircuitOpen { .. } => "NodeCircuitOpenError",
            NodeError::RetryExhausted { .. } => "NodeRetryExhaustedError",
            NodeError::Network { .. } => "NetworkError",
            NodeError::RateLimited { .. } => "RateLimitError",
            NodeError::Failed { .. } => "NodeError",
        }
    }

    /// Returns the stable error code used in serialized reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Validation(_) => "VALIDATION_ERROR",
            NodeError::Programming { .. } => "PROGRAMMING_ERROR",
            NodeError::Timeout { .. } => "NODE_TIMEOUT",
            NodeError::Cancelled { .. } => "NODE_CANCELLED",
            NodeError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            NodeError::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            NodeError::Network { .. } => "NETWORK_ERROR",
            NodeError::RateLimited { .. } => "RATE_LIMITED",
            NodeError::Failed { .. } => "NODE_ERROR",
        }
    }

    /// Returns the node this error is bound to, if the variant names one.
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        match self {
            NodeError::Timeout { node_name, .. }
            | NodeError::Cancelled { node_name }
            | NodeError::CircuitOpen { node_name, .. }
            | NodeError::RetryExhausted { node_name, .. } => Some(node_name),
            _ => None,
        }
    }

    /// Returns `true` for [`NodeError::Cancelled`].
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NodeError::Cancelled { .. })
    }
}

impl From<ValidationError> for NodeError {
    fn from(err: ValidationError) -> Self {
        NodeError::Validation(err)
    }
}

impl From<String> for NodeError {
    fn from(message: String) -> Self {
        NodeError::failed(message)
    }
}

impl From<&str> for NodeError {
    fn from(message: &str) -> Self {
        NodeError::failed(message)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => NodeError::Network {
                message: err.to_string(),
            },
            _ => NodeError::wrap(err),
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        let path = if err.line() == 0 {
            String::new()
        } else {
            format!("line {} column {}", err.line(), err.column())
        };
        NodeError::Validation(ValidationError::single(path, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display() {
        let err = NodeError::Timeout {
            node_name: "job-1".into(),
            timeout: Duration::from_millis(5000),
        };
        assert_eq!(err.to_string(), "node 'job-1' timed out after 5000ms");
        assert_eq!(err.code(), "NODE_TIMEOUT");
        assert_eq!(err.node_name(), Some("job-1"));
    }

    #[test]
    fn retry_exhausted_display_includes_last_error() {
        let err = NodeError::RetryExhausted {
            node_name: "fetch".into(),
            attempts: 3,
            last_error: Box::new(NodeError::failed("ECONNREFUSED")),
        };
        assert_eq!(
            err.to_string(),
            "node 'fetch' failed after 3 attempts: ECONNREFUSED"
        );
    }

    #[test]
    fn validation_display_lists_issues() {
        let err = NodeError::from(ValidationError::new(vec![
            ValidationIssue::new("story.id", "required"),
            ValidationIssue::new("", "unexpected field"),
        ]));
        assert_eq!(
            err.to_string(),
            "validation failed: story.id: required; unexpected field"
        );
    }

    #[test]
    fn rate_limited_display_mentions_retry_after() {
        let err = NodeError::rate_limited("slow down", Some(Duration::from_secs(2)));
        assert_eq!(err.to_string(), "slow down, retry after 2s");
        let err = NodeError::rate_limited("slow down", None);
        assert_eq!(err.to_string(), "slow down");
    }

    #[test]
    fn io_connection_errors_become_network() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(NodeError::from(io), NodeError::Network { .. }));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = NodeError::from(io);
        assert!(matches!(err, NodeError::Failed { source: Some(_), .. }));
        assert!(core::error::Error::source(&err).is_some());
    }

    #[test]
    fn serde_json_errors_become_validation() {
        let err: NodeError = serde_json::from_str::<u32>("\"nope\"").unwrap_err().into();
        match err {
            NodeError::Validation(v) => {
                assert_eq!(v.issues.len(), 1);
                assert!(v.issues[0].path.starts_with("line 1"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn panic_payloads_are_preserved() {
        let payload: Box<dyn core::any::Any + Send> = Box::new("boom");
        let err = NodeError::from_panic(payload.as_ref());
        assert_eq!(err.to_string(), "programming error (panic): boom");

        let payload: Box<dyn core::any::Any + Send> = Box::new(String::from("owned boom"));
        let err = NodeError::from_panic(payload.as_ref());
        assert!(err.to_string().ends_with("owned boom"));

        let payload: Box<dyn core::any::Any + Send> = Box::new(7_u8);
        let err = NodeError::from_panic(payload.as_ref());
        assert!(err.to_string().ends_with("work function panicked"));
    }
}
