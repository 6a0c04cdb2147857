//! Classification invariants exercised over generated failures.

use core::time::Duration;

use meridian_errors::{
    ErrorCategory, NodeError, ProgrammingErrorKind, RecoveryAction, ValidationError,
    classify_error, is_retryable_node_error,
};
use proptest::prelude::*;

/// Generates an arbitrary failure, covering every variant.
fn arb_node_error() -> impl Strategy<Value = NodeError> {
    let leaf = prop_oneof![
        ".*".prop_map(|m| NodeError::from(ValidationError::single("field", m))),
        ".*".prop_map(|message| NodeError::Programming {
            kind: ProgrammingErrorKind::Panic,
            message,
        }),
        ("[a-z-]{1,12}", 1_u64..100_000).prop_map(|(node_name, ms)| NodeError::Timeout {
            node_name,
            timeout: Duration::from_millis(ms),
        }),
        "[a-z-]{1,12}".prop_map(|node_name| NodeError::Cancelled { node_name }),
        ("[a-z-]{1,12}", 1_u32..20).prop_map(|(node_name, n)| NodeError::CircuitOpen {
            node_name,
            consecutive_failures: n,
            recovery_time: Duration::from_secs(30),
        }),
        ".*".prop_map(NodeError::network),
        ".*".prop_map(|m| NodeError::rate_limited(m, None)),
        ".*".prop_map(NodeError::failed),
        prop_oneof![
            Just("ECONNREFUSED"),
            Just("socket hang up"),
            Just("Too Many Requests"),
            Just("quota exceeded"),
        ]
        .prop_map(NodeError::failed),
    ];

    leaf.prop_recursive(2, 8, 1, |inner| {
        ("[a-z-]{1,12}", 1_u32..5, inner).prop_map(|(node_name, attempts, last)| {
            NodeError::RetryExhausted {
                node_name,
                attempts,
                last_error: Box::new(last),
            }
        })
    })
}

proptest! {
    #[test]
    fn retryability_never_diverges_from_classification(err in arb_node_error()) {
        prop_assert_eq!(is_retryable_node_error(&err), classify_error(&err).is_retryable);
    }

    #[test]
    fn retryability_is_fixed_per_category(err in arb_node_error()) {
        let c = classify_error(&err);
        let expected = matches!(
            c.category,
            ErrorCategory::Timeout
                | ErrorCategory::Network
                | ErrorCategory::RateLimit
                | ErrorCategory::Unknown
        );
        prop_assert_eq!(c.is_retryable, expected);
        prop_assert_eq!(c.action == RecoveryAction::Retry, expected);
    }

    #[test]
    fn classification_is_deterministic(err in arb_node_error()) {
        prop_assert_eq!(classify_error(&err), classify_error(&err.clone()));
    }
}

#[test]
fn exhausted_failure_ignores_the_node_name() {
    let err = NodeError::RetryExhausted {
        node_name: "throttled-sync".into(),
        attempts: 3,
        last_error: Box::new(NodeError::failed("schema mismatch")),
    };
    assert_eq!(classify_error(&err).category, ErrorCategory::Unknown);
}

#[test]
fn exhausted_network_failure_is_classified_by_its_message() {
    let err = NodeError::RetryExhausted {
        node_name: "fetch".into(),
        attempts: 3,
        last_error: Box::new(NodeError::failed("ECONNREFUSED")),
    };
    assert_eq!(classify_error(&err).category, ErrorCategory::Network);
}
