//! Failure taxonomy for node execution.
//!
//! `meridian_errors` defines the closed set of ways a node invocation can
//! fail ([`NodeError`]), the classifier that turns any such failure into a
//! retry/fail/cancel decision ([`classify_error`]), and the serializable
//! diagnostic shape persisted for terminal failures ([`ErrorReport`]).
//!
//! # Example
//!
//! ```
//! use meridian_errors::{ErrorCategory, NodeError, RecoveryAction, classify_error};
//!
//! let err = NodeError::failed("connect ECONNREFUSED 127.0.0.1:5432");
//! let verdict = classify_error(&err);
//!
//! assert_eq!(verdict.category, ErrorCategory::Network);
//! assert_eq!(verdict.action, RecoveryAction::Retry);
//! assert!(verdict.is_retryable);
//! ```

/// Error classification and retry decisions.
pub mod classify;

/// The node failure enum and its building blocks.
pub mod error;

/// Serializable error reports.
pub mod report;

/// Stack trace sanitization.
pub mod stack;

pub use classify::{
    ErrorCategory, ErrorClassification, RecoveryAction, classify_error, classify_optional,
    is_retryable_node_error,
};
pub use error::{NodeError, ProgrammingErrorKind, ValidationError, ValidationIssue};
pub use report::ErrorReport;
pub use stack::StackSanitizer;
