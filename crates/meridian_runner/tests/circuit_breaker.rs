//! Circuit breaking across node invocations, driven by a mock clock.


use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use meridian_core::MockClock;
use meridian_errors::{NodeError, ValidationError};
use meridian_runner::{
    CancellationSignal, CircuitBreakerRegistry, CircuitState, NodeRunner, RunnerConfig,
    RunnerEvent, RunnerEventKind,
};
use test_utils::EventLog;
use tokio::sync::Notify;

/// Threshold 2, 30s recovery, no retries, breaker time from a mock clock.
fn fixture() -> (NodeRunner, Arc<MockClock>, EventLog) {
    let config = RunnerConfig::default()
        .with_max_retries(0)
        .with_failure_threshold(2)
        .with_recovery_time(Duration::from_secs(30));
    let (mock, clock) = MockClock::shared();
    let breakers = Arc::new(CircuitBreakerRegistry::with_clock(
        config.circuit_breaker(),
        clock,
    ));
    let runner = NodeRunner::new(config).unwrap().with_breakers(breakers);
    let log = EventLog::attach(runner.hooks());
    (runner, mock, log)
}

async fn fail_once(runner: &NodeRunner, node: &str) -> NodeError {
    runner
        .run(node, &CancellationSignal::new(), || async {
            Err::<(), _>(ValidationError::single("input", "bad"))
        })
        .await
        .unwrap_err()
}

async fn succeed_once(runner: &NodeRunner, node: &str) -> Result<(), NodeError> {
    runner
        .run(node, &CancellationSignal::new(), || async {
            Ok::<_, NodeError>(())
        })
        .await
}

#[tokio::test]
async fn opens_after_threshold_without_calling_work() {
    let (runner, _, log) = fixture();
    fail_once(&runner, "flaky").await;
    fail_once(&runner, "flaky").await;
    assert_eq!(runner.breakers().state("flaky"), CircuitState::Open);

    let calls = AtomicU32::new(0);
    let err = runner
        .run("flaky", &CancellationSignal::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, NodeError>(()) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CIRCUIT_OPEN");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        log.events().last(),
        Some(RunnerEvent::CircuitRejected { consecutive_failures: 2, .. })
    ));
    // rejection is not a new failure
    assert_eq!(runner.breakers().snapshot("flaky").unwrap().consecutive_failures, 2);
}

#[tokio::test]
async fn recovers_through_a_successful_trial() {
    let (runner, mock, _) = fixture();
    fail_once(&runner, "flaky").await;
    fail_once(&runner, "flaky").await;

    mock.advance(Duration::from_secs(29));
    assert_eq!(succeed_once(&runner, "flaky").await.unwrap_err().code(), "CIRCUIT_OPEN");

    mock.advance(Duration::from_secs(1));
    succeed_once(&runner, "flaky").await.unwrap();
    let snapshot = runner.breakers().snapshot("flaky").unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
}

#[tokio::test]
async fn failed_trial_reopens() {
    let (runner, mock, _) = fixture();
    fail_once(&runner, "flaky").await;
    fail_once(&runner, "flaky").await;
    mock.advance(Duration::from_secs(30));

    assert!(matches!(fail_once(&runner, "flaky").await, NodeError::Validation(_)));
    assert_eq!(runner.breakers().state("flaky"), CircuitState::Open);
    assert_eq!(succeed_once(&runner, "flaky").await.unwrap_err().code(), "CIRCUIT_OPEN");
}

#[tokio::test]
async fn half_open_admits_a_single_trial() {
    let (runner, mock, log) = fixture();
    fail_once(&runner, "flaky").await;
    fail_once(&runner, "flaky").await;
    mock.advance(Duration::from_secs(30));
    log.clear();

    let gate = Arc::new(Notify::new());
    let signal = CancellationSignal::new();
    let trial = runner.run("flaky", &signal, || {
        let gate = Arc::clone(&gate);
        async move {
            gate.notified().await;
            Ok::<_, NodeError>("trial")
        }
    });
    let second = async {
        let result = succeed_once(&runner, "flaky").await;
        gate.notify_one();
        result
    };

    let (trial, second) = tokio::join!(trial, second);
    assert_eq!(trial.unwrap(), "trial");
    assert_eq!(second.unwrap_err().code(), "CIRCUIT_OPEN");
    assert_eq!(log.count(RunnerEventKind::CircuitRejected), 1);
    assert_eq!(runner.breakers().state("flaky"), CircuitState::Closed);
}

#[tokio::test]
async fn cancelled_trial_frees_the_slot() {
    let (runner, mock, _) = fixture();
    fail_once(&runner, "flaky").await;
    fail_once(&runner, "flaky").await;
    mock.advance(Duration::from_secs(30));

    let signal = CancellationSignal::new();
    let trigger = signal.clone();
    let err = runner
        .run("flaky", &signal, || {
            let trigger = trigger.clone();
            async move {
                trigger.fire();
                futures::future::pending::<Result<(), NodeError>>().await
            }
        })
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(runner.breakers().state("flaky"), CircuitState::HalfOpen);

    succeed_once(&runner, "flaky").await.unwrap();
    assert_eq!(runner.breakers().state("flaky"), CircuitState::Closed);
}

#[tokio::test]
async fn breakers_are_per_node() {
    let (runner, _, _) = fixture();
    fail_once(&runner, "a").await;
    fail_once(&runner, "a").await;

    succeed_once(&runner, "b").await.unwrap();
    assert_eq!(runner.breakers().state("a"), CircuitState::Open);
    assert!(runner.breakers().snapshot("b").is_none());
}

#[tokio::test]
async fn shared_registry_is_seen_by_every_runner() {
    let (first, _, _) = fixture();
    let second = NodeRunner::new(RunnerConfig::default())
        .unwrap()
        .with_breakers(Arc::clone(first.breakers()));

    fail_once(&first, "shared").await;
    fail_once(&first, "shared").await;
    assert_eq!(succeed_once(&second, "shared").await.unwrap_err().code(), "CIRCUIT_OPEN");
}
