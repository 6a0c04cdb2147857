//! Running a single node.
//!
//! [`NodeRunner::run`] wraps a work function with everything a plan node
//! needs to survive a hostile environment:
//!
//! 1. If the run's [`CancellationSignal`] has fired, fail with
//!    [`NodeError::Cancelled`] without calling the work function.
//! 2. Ask the node's circuit breaker for admission; an open circuit fails
//!    immediately with [`NodeError::CircuitOpen`].
//! 3. Race the work against the per-attempt timeout and the signal. The
//!    signal wins over a timeout that elapses at the same instant. A panic
//!    inside the work becomes [`NodeError::Programming`].
//! 4. Classify any failure. Retryable failures sleep for the backoff delay
//!    and go back to step 1; the sleep is cut short by cancellation.
//! 5. Report the terminal outcome to the breaker, the metrics collector and
//!    the hooks, then return it. Retryable failures that run out of attempts
//!    end as [`NodeError::RetryExhausted`].
//!
//! Cancellation and circuit rejection are never counted as failures by the
//! breaker.

use core::future::Future;
use core::panic::AssertUnwindSafe;
use core::time::Duration;
use std::sync::Arc;

use futures::FutureExt;
use meridian_errors::{
    ErrorClassification, ErrorReport, NodeError, RecoveryAction, StackSanitizer, ValidationError,
    classify_error,
};
use tokio::time::Instant;
use tracing::Instrument;

use crate::backoff::BackoffPolicy;
use crate::breaker::{CircuitBreakerRegistry, CircuitPermit};
use crate::cancel::CancellationSignal;
use crate::config::{ConfigError, RunnerConfig};
use crate::hooks::{RunnerEvent, RunnerHooks};
use crate::metrics::NodeMetricsCollector;

/// Per-invocation overrides of the runner's configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay policy between attempts.
    pub backoff: BackoffPolicy,
}

impl From<&RunnerConfig> for RunOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl RunOptions {
    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Executes node work with timeouts, retries, circuit breaking and
/// cancellation.
///
/// Cloning is cheap; clones share the breaker registry, hooks and metrics.
#[derive(Debug, Clone)]
pub struct NodeRunner {
    config: RunnerConfig,
    breakers: Arc<CircuitBreakerRegistry>,
    hooks: Arc<RunnerHooks>,
    metrics: Option<Arc<NodeMetricsCollector>>,
    sanitizer: StackSanitizer,
}

impl NodeRunner {
    /// Creates a runner with its own breaker registry and no observers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            breakers: Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker())),
            hooks: Arc::new(RunnerHooks::new()),
            metrics: None,
            sanitizer: StackSanitizer::default(),
            config,
        })
    }

    /// Shares an existing breaker registry.
    #[must_use]
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    /// Shares an existing hook registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<RunnerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Records outcomes into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<NodeMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets how stack traces in failure reports are cleaned up.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: StackSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// The runner's configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The breaker registry.
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// The hook registry.
    #[must_use]
    pub fn hooks(&self) -> &Arc<RunnerHooks> {
        &self.hooks
    }

    /// The metrics collector, if any.
    #[must_use]
    pub fn metrics(&self) -> Option<&Arc<NodeMetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Runs `work` as node `node_name` with the runner's configuration.
    ///
    /// `work` is called once per attempt and must produce a fresh future
    /// each time.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`NodeError`]: the failure itself when it is not
    /// retryable, [`NodeError::RetryExhausted`] when retries ran out,
    /// [`NodeError::CircuitOpen`] when the breaker rejected the call, or
    /// [`NodeError::Cancelled`] when the signal fired first.
    pub async fn run<T, E, F, Fut>(
        &self,
        node_name: &str,
        signal: &CancellationSignal,
        work: F,
    ) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        let options = RunOptions::from(&self.config);
        self.run_with(node_name, &options, signal, work).await
    }

    /// Like [`run`](Self::run) with per-call options.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run). An empty node name is rejected as a
    /// validation error before anything else happens.
    pub async fn run_with<T, E, F, Fut>(
        &self,
        node_name: &str,
        options: &RunOptions,
        signal: &CancellationSignal,
        mut work: F,
    ) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        if node_name.trim().is_empty() {
            let issue = ValidationError::single("node_name", "node name must not be empty");
            return Err(issue.into());
        }
        let span = tracing::info_span!("node", node = %node_name);
        self.drive(node_name, options, signal, &mut work)
            .instrument(span)
            .await
    }

    async fn drive<T, E, F, Fut>(
        &self,
        node_name: &str,
        options: &RunOptions,
        signal: &CancellationSignal,
        work: &mut F,
    ) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        let started = Instant::now();
        // A half-open trial covers every attempt of this invocation.
        let mut permit: Option<CircuitPermit> = None;
        let mut attempt: u32 = 0;

        loop {
            if signal.is_fired() {
                return Err(self.cancelled(node_name, attempt));
            }
            if !permit.as_ref().is_some_and(CircuitPermit::is_trial) {
                match self.breakers.acquire(node_name) {
                    Ok(admitted) => permit = Some(admitted),
                    Err(err) => return Err(self.rejected(node_name, err)),
                }
            }

            tracing::debug!(attempt, "attempt started");
            self.hooks.invoke(&RunnerEvent::AttemptStarted {
                node_name: node_name.to_string(),
                attempt,
            });

            let err = match self.attempt(node_name, options.timeout, signal, work).await {
                Ok(value) => {
                    self.succeeded(node_name, attempt + 1, started.elapsed());
                    return Ok(value);
                }
                Err(err) => err,
            };
            if err.is_cancellation() {
                return Err(self.cancelled(node_name, attempt + 1));
            }

            let classification = classify_error(&err);
            if let NodeError::Timeout { timeout, .. } = &err {
                self.hooks.invoke(&RunnerEvent::TimedOut {
                    node_name: node_name.to_string(),
                    attempt,
                    timeout: *timeout,
                });
            }
            self.hooks.invoke(&RunnerEvent::AttemptFailed {
                node_name: node_name.to_string(),
                attempt,
                error: err.to_string(),
                classification: classification.clone(),
            });

            match classification.action {
                RecoveryAction::Retry if attempt < options.max_retries => {
                    let delay = options.backoff.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        category = %classification.category,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.hooks.invoke(&RunnerEvent::RetryScheduled {
                        node_name: node_name.to_string(),
                        attempt,
                        delay,
                    });
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(node_name, attempt);
                    }
                    tokio::select! {
                        biased;
                        () = signal.fired() => return Err(self.cancelled(node_name, attempt)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RecoveryAction::Retry => {
                    let terminal = NodeError::RetryExhausted {
                        node_name: node_name.to_string(),
                        attempts: attempt + 1,
                        last_error: Box::new(err),
                    };
                    return Err(self.failed(
                        node_name,
                        attempt + 1,
                        started.elapsed(),
                        terminal,
                        &classification,
                    ));
                }
                RecoveryAction::Fail => {
                    return Err(self.failed(
                        node_name,
                        attempt + 1,
                        started.elapsed(),
                        err,
                        &classification,
                    ));
                }
                RecoveryAction::Cancel => return Err(self.cancelled(node_name, attempt + 1)),
            }
        }
    }

    /// One attempt: the work raced against the deadline and the signal.
    async fn attempt<T, E, F, Fut>(
        &self,
        node_name: &str,
        timeout: Duration,
        signal: &CancellationSignal,
        work: &mut F,
    ) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| work())) {
            Ok(future) => future,
            Err(payload) => return Err(NodeError::from_panic(&*payload)),
        };
        let guarded = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result.map_err(Into::into),
                Err(payload) => Err(NodeError::from_panic(&*payload)),
            }
        };

        let outcome = tokio::select! {
            biased;
            () = signal.fired() => return Err(cancelled_error(node_name)),
            outcome = tokio::time::timeout(timeout, guarded) => outcome,
        };
        match outcome {
            Ok(result) => result,
            Err(_) if signal.is_fired() => Err(cancelled_error(node_name)),
            Err(_) => Err(NodeError::Timeout {
                node_name: node_name.to_string(),
                timeout,
            }),
        }
    }

    fn succeeded(&self, node_name: &str, attempts: u32, duration: Duration) {
        self.breakers.record_success(node_name);
        if let Some(metrics) = &self.metrics {
            metrics.record_success(node_name, duration);
        }
        tracing::info!(
            attempts,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "node succeeded"
        );
        self.hooks.invoke(&RunnerEvent::Succeeded {
            node_name: node_name.to_string(),
            attempts,
            duration,
        });
    }

    fn failed(
        &self,
        node_name: &str,
        attempts: u32,
        duration: Duration,
        err: NodeError,
        classification: &ErrorClassification,
    ) -> NodeError {
        let state = self.breakers.record_failure(node_name);
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(node_name, duration, classification.category.into());
        }
        tracing::error!(
            attempts,
            code = err.code(),
            category = %classification.category,
            circuit = ?state,
            error = %err,
            "node failed"
        );
        let report = ErrorReport::capture(&err, node_name, &self.sanitizer);
        self.hooks.invoke(&RunnerEvent::Failed {
            node_name: node_name.to_string(),
            attempts,
            report: Box::new(report),
        });
        err
    }

    fn cancelled(&self, node_name: &str, attempts: u32) -> NodeError {
        tracing::info!(attempts, "node cancelled");
        self.hooks.invoke(&RunnerEvent::Cancelled {
            node_name: node_name.to_string(),
            attempts,
        });
        cancelled_error(node_name)
    }

    fn rejected(&self, node_name: &str, err: NodeError) -> NodeError {
        if let NodeError::CircuitOpen {
            consecutive_failures,
            ..
        } = &err
        {
            tracing::warn!(consecutive_failures, "circuit open, node rejected");
            self.hooks.invoke(&RunnerEvent::CircuitRejected {
                node_name: node_name.to_string(),
                consecutive_failures: *consecutive_failures,
            });
        }
        err
    }
}

fn cancelled_error(node_name: &str) -> NodeError {
    NodeError::Cancelled {
        node_name: node_name.to_string(),
    }
}
