//! Serializable error reports.
//!
//! An [`ErrorReport`] is the persisted form of a terminal node failure:
//! `{name, message, code, nodeName, timestamp, ...subtype fields, stack}`.

use core::time::Duration;
use std::backtrace::{Backtrace, BacktraceStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::NodeError;
use crate::stack::StackSanitizer;

/// Diagnostic snapshot of a node failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Error type name, e.g. `NodeTimeoutError`.
    pub name: String,
    /// Display message.
    pub message: String,
    /// Stable error code, e.g. `NODE_TIMEOUT`.
    pub code: String,
    /// Node the failure belongs to.
    pub node_name: String,
    /// When the report was created.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
    /// Sanitized stack trace, when one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorReport {
    /// Builds a report without a stack trace.
    #[must_use]
    pub fn from_error(err: &NodeError, node_name: &str) -> Self {
        Self {
            name: err.name().to_string(),
            message: err.to_string(),
            code: err.code().to_string(),
            node_name: err.node_name().unwrap_or(node_name).to_string(),
            timestamp: Utc::now(),
            details: details(err, node_name),
            stack: None,
        }
    }

    /// Builds a report and attaches a sanitized backtrace of the current
    /// call site.
    ///
    /// The backtrace is captured regardless of `RUST_BACKTRACE`; the stack is
    /// only absent on platforms without backtrace support.
    #[must_use]
    pub fn capture(err: &NodeError, node_name: &str, sanitizer: &StackSanitizer) -> Self {
        let backtrace = Backtrace::force_capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => Some(sanitizer.sanitize(&backtrace.to_string())),
            _ => None,
        };
        Self {
            stack,
            ..Self::from_error(err, node_name)
        }
    }

    /// Serializes the report to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn details(err: &NodeError, node_name: &str) -> Map<String, Value> {
    let value = match err {
        NodeError::Validation(v) => json!({ "issues": v.issues }),
        NodeError::Programming { kind, .. } => json!({ "kind": kind }),
        NodeError::Timeout { timeout, .. } => json!({ "timeoutMs": millis(*timeout) }),
        NodeError::CircuitOpen {
            consecutive_failures,
            recovery_time,
            ..
        } => json!({
            "consecutiveFailures": consecutive_failures,
            "recoveryTimeMs": millis(*recovery_time),
        }),
        NodeError::RetryExhausted {
            attempts,
            last_error,
            ..
        } => {
            let last = ErrorReport::from_error(last_error, node_name);
            json!({
                "attempts": attempts,
                "lastError": {
                    "name": last.name,
                    "message": last.message,
                    "code": last.code,
                    "details": last.details,
                },
            })
        }
        NodeError::RateLimited {
            retry_after: Some(after),
            ..
        } => json!({ "retryAfterMs": millis(*after) }),
        NodeError::Cancelled { .. }
        | NodeError::Network { .. }
        | NodeError::RateLimited { .. }
        | NodeError::Failed { .. } => json!({}),
    };

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn timeout_report_shape() {
        let err = NodeError::Timeout {
            node_name: "job-1".into(),
            timeout: Duration::from_millis(5000),
        };
        let json = ErrorReport::from_error(&err, "ignored").to_json();

        assert_eq!(json["name"], "NodeTimeoutError");
        assert_eq!(json["code"], "NODE_TIMEOUT");
        assert_eq!(json["nodeName"], "job-1");
        assert_eq!(json["timeoutMs"], 5000);
        assert!(json["timestamp"].is_string());
        assert!(json.get("stack").is_none());
    }

    #[test]
    fn unbound_errors_take_the_supplied_node_name() {
        let report = ErrorReport::from_error(&NodeError::failed("boom"), "job-2");
        assert_eq!(report.node_name, "job-2");
        assert_eq!(report.code, "NODE_ERROR");
        assert!(report.details.is_empty());
    }

    #[test]
    fn retry_exhausted_embeds_last_error() {
        let err = NodeError::RetryExhausted {
            node_name: "fetch".into(),
            attempts: 3,
            last_error: Box::new(NodeError::network("ECONNREFUSED")),
        };
        let json = ErrorReport::from_error(&err, "fetch").to_json();

        assert_eq!(json["attempts"], 3);
        assert_eq!(json["lastError"]["code"], "NETWORK_ERROR");
        assert_eq!(json["lastError"]["message"], "ECONNREFUSED");
    }

    #[test]
    fn validation_report_lists_issues() {
        let err = NodeError::from(ValidationError::single("story.id", "required"));
        let json = ErrorReport::from_error(&err, "load").to_json();
        assert_eq!(json["issues"][0]["path"], "story.id");
    }

    #[test]
    fn report_round_trips_through_json() {
        let err = NodeError::CircuitOpen {
            node_name: "flaky".into(),
            consecutive_failures: 5,
            recovery_time: Duration::from_secs(60),
        };
        let report = ErrorReport::from_error(&err, "flaky");
        let text = serde_json::to_string(&report).unwrap();
        let back: ErrorReport = serde_json::from_str(&text).unwrap();

        assert_eq!(back, report);
        assert_eq!(back.details["recoveryTimeMs"], 60_000);
    }

    #[test]
    fn capture_attaches_a_stack_without_backtrace_env() {
        // RUST_BACKTRACE is irrelevant to terminal reports.
        let report = ErrorReport::capture(
            &NodeError::failed("boom"),
            "job",
            &StackSanitizer::default(),
        );
        assert_eq!(report.message, "boom");
        let stack = report.stack.expect("terminal reports carry a stack");
        assert!(stack.len() <= crate::stack::DEFAULT_MAX_STACK_LEN);
    }
}
