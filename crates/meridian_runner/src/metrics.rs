//! Per-node execution metrics.
//!
//! [`NodeMetricsCollector`] counts executions, failures and retries per node,
//! keeps a rolling window of recent durations for percentiles, and buckets
//! failures into coarse categories. Optional thresholds fire callbacks when a
//! node's failure rate or p99 latency gets too high.
//!
//! Durations are reported in fractional milliseconds.

use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};

use hashbrown::HashMap;
use meridian_errors::ErrorCategory;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Default number of samples kept for percentiles.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Failure buckets tracked by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsErrorCategory {
    /// Deadline exceeded.
    Timeout,
    /// Bad input or output.
    Validation,
    /// Transport failure.
    Network,
    /// Everything else.
    Other,
}

impl From<ErrorCategory> for MetricsErrorCategory {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Timeout => Self::Timeout,
            ErrorCategory::Validation => Self::Validation,
            ErrorCategory::Network => Self::Network,
            _ => Self::Other,
        }
    }
}

/// Metrics for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    /// Completed executions, successful or not.
    pub total_executions: u64,
    /// Successful executions.
    pub success_count: u64,
    /// Failed executions.
    pub failure_count: u64,
    /// Retries scheduled.
    pub retry_count: u64,
    /// Duration of the most recent execution.
    pub last_execution_ms: Option<f64>,
    /// Mean duration over all executions.
    pub avg_execution_ms: f64,
    /// Median of the window.
    pub p50: Option<f64>,
    /// 90th percentile of the window.
    pub p90: Option<f64>,
    /// 99th percentile of the window.
    pub p99: Option<f64>,
    /// Failures categorized as timeouts.
    pub timeout_errors: u64,
    /// Failures categorized as validation errors.
    pub validation_errors: u64,
    /// Failures categorized as network errors.
    pub network_errors: u64,
    /// All other failures.
    pub other_errors: u64,
}

impl NodeMetrics {
    /// Failed executions over total executions; `0.0` before any execution.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.total_executions as f64
        }
    }
}

/// Collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Samples kept per node for percentiles.
    pub window_size: usize,
    /// Failure rate (0 to 1) above which the failure-rate callback fires.
    pub failure_rate_threshold: Option<f64>,
    /// p99 latency above which the latency callback fires.
    pub latency_threshold_ms: Option<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            failure_rate_threshold: None,
            latency_threshold_ms: None,
        }
    }
}

impl MetricsConfig {
    /// Checks the window size and failure-rate threshold.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if let Some(rate) = self.failure_rate_threshold
            && !(0.0..=1.0).contains(&rate)
        {
            return Err(ConfigError::InvalidFailureRate(rate));
        }
        Ok(())
    }
}

type RateCallback = Box<dyn Fn(&str, f64) + Send + Sync>;

#[derive(Debug)]
struct RollingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Percentile by nearest-rank-below: index `floor(p / 100 * (n - 1))`.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((p / 100.0) * (sorted.len() - 1) as f64).floor() as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

#[derive(Debug)]
struct NodeState {
    total_executions: u64,
    success_count: u64,
    failure_count: u64,
    retry_count: u64,
    last_execution_ms: Option<f64>,
    total_duration_ms: f64,
    timeout_errors: u64,
    validation_errors: u64,
    network_errors: u64,
    other_errors: u64,
    window: RollingWindow,
}

impl NodeState {
    fn new(window_size: usize) -> Self {
        Self {
            total_executions: 0,
            success_count: 0,
            failure_count: 0,
            retry_count: 0,
            last_execution_ms: None,
            total_duration_ms: 0.0,
            timeout_errors: 0,
            validation_errors: 0,
            network_errors: 0,
            other_errors: 0,
            window: RollingWindow::new(window_size),
        }
    }

    fn record_execution(&mut self, ms: f64) {
        self.total_executions += 1;
        self.last_execution_ms = Some(ms);
        self.total_duration_ms += ms;
        self.window.push(ms);
    }

    fn metrics(&self) -> NodeMetrics {
        let sorted = self.window.sorted();
        NodeMetrics {
            total_executions: self.total_executions,
            success_count: self.success_count,
            failure_count: self.failure_count,
            retry_count: self.retry_count,
            last_execution_ms: self.last_execution_ms,
            avg_execution_ms: if self.total_executions == 0 {
                0.0
            } else {
                self.total_duration_ms / self.total_executions as f64
            },
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p99: percentile(&sorted, 99.0),
            timeout_errors: self.timeout_errors,
            validation_errors: self.validation_errors,
            network_errors: self.network_errors,
            other_errors: self.other_errors,
        }
    }
}

/// Thread-safe per-node metrics.
///
/// Callbacks run on the recording thread after the collector's lock has been
/// released.
pub struct NodeMetricsCollector {
    config: MetricsConfig,
    on_failure_rate: Option<RateCallback>,
    on_latency: Option<RateCallback>,
    nodes: Mutex<HashMap<String, NodeState>>,
}

impl core::fmt::Debug for NodeMetricsCollector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeMetricsCollector")
            .field("config", &self.config)
            .field("nodes", &self.nodes.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for NodeMetricsCollector {
    fn default() -> Self {
        Self {
            config: MetricsConfig::default(),
            on_failure_rate: None,
            on_latency: None,
            nodes: Mutex::new(HashMap::new()),
        }
    }
}

impl NodeMetricsCollector {
    /// Creates a collector with the default window and no thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn with_config(config: MetricsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Sets the callback fired when a node's failure rate exceeds the
    /// configured threshold. Receives the node name and the rate.
    #[must_use]
    pub fn on_failure_rate_threshold<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.on_failure_rate = Some(Box::new(callback));
        self
    }

    /// Sets the callback fired when a node's p99 latency exceeds the
    /// configured threshold. Receives the node name and the p99 in ms.
    #[must_use]
    pub fn on_latency_threshold<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.on_latency = Some(Box::new(callback));
        self
    }

    /// Records a successful execution.
    pub fn record_success(&self, node_name: &str, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        let metrics = {
            let mut nodes = self.nodes.lock();
            let state = self.state_mut(&mut nodes, node_name);
            state.success_count += 1;
            state.record_execution(ms);
            state.metrics()
        };
        self.check_thresholds(node_name, &metrics);
    }

    /// Records a failed execution under `category`.
    pub fn record_failure(
        &self,
        node_name: &str,
        duration: Duration,
        category: MetricsErrorCategory,
    ) {
        let ms = duration.as_secs_f64() * 1000.0;
        let metrics = {
            let mut nodes = self.nodes.lock();
            let state = self.state_mut(&mut nodes, node_name);
            state.failure_count += 1;
            match category {
                MetricsErrorCategory::Timeout => state.timeout_errors += 1,
                MetricsErrorCategory::Validation => state.validation_errors += 1,
                MetricsErrorCategory::Network => state.network_errors += 1,
                MetricsErrorCategory::Other => state.other_errors += 1,
            }
            state.record_execution(ms);
            state.metrics()
        };
        self.check_thresholds(node_name, &metrics);
    }

    /// Records a scheduled retry. `attempt` is the attempt about to run.
    pub fn record_retry(&self, node_name: &str, attempt: u32) {
        let mut nodes = self.nodes.lock();
        self.state_mut(&mut nodes, node_name).retry_count += 1;
        tracing::trace!(node = node_name, attempt, "retry recorded");
    }

    /// Metrics for one node; all zero for an unknown node.
    #[must_use]
    pub fn node_metrics(&self, node_name: &str) -> NodeMetrics {
        self.nodes
            .lock()
            .get(node_name)
            .map(NodeState::metrics)
            .unwrap_or_default()
    }

    /// Metrics for every node seen, ordered by name. This is also the
    /// serializable snapshot.
    #[must_use]
    pub fn all_metrics(&self) -> BTreeMap<String, NodeMetrics> {
        self.nodes
            .lock()
            .iter()
            .map(|(name, state)| (name.clone(), state.metrics()))
            .collect()
    }

    /// Clears one node, or every node when `node_name` is `None`.
    pub fn reset(&self, node_name: Option<&str>) {
        let mut nodes = self.nodes.lock();
        match node_name {
            Some(name) => {
                nodes.remove(name);
            }
            None => nodes.clear(),
        }
    }

    fn state_mut<'a>(
        &self,
        nodes: &'a mut HashMap<String, NodeState>,
        node_name: &str,
    ) -> &'a mut NodeState {
        nodes
            .entry_ref(node_name)
            .or_insert_with(|| NodeState::new(self.config.window_size.max(1)))
    }

    fn check_thresholds(&self, node_name: &str, metrics: &NodeMetrics) {
        if let (Some(threshold), Some(callback)) =
            (self.config.failure_rate_threshold, &self.on_failure_rate)
        {
            let rate = metrics.failure_rate();
            if metrics.total_executions > 0 && rate > threshold {
                tracing::warn!(node = node_name, rate, threshold, "failure rate above threshold");
                callback(node_name, rate);
            }
        }
        if let (Some(threshold), Some(callback), Some(p99)) =
            (self.config.latency_threshold_ms, &self.on_latency, metrics.p99)
            && p99 > threshold
        {
            tracing::warn!(node = node_name, p99, threshold, "p99 latency above threshold");
            callback(node_name, p99);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn unknown_node_has_empty_metrics() {
        let metrics = NodeMetricsCollector::new().node_metrics("nope");
        assert_eq!(metrics, NodeMetrics::default());
        assert_eq!(metrics.p50, None);
    }

    #[test]
    fn counts_and_average() {
        let collector = NodeMetricsCollector::new();
        collector.record_success("a", ms(100));
        collector.record_success("a", ms(200));
        collector.record_failure("a", ms(300), MetricsErrorCategory::Network);
        collector.record_retry("a", 1);

        let m = collector.node_metrics("a");
        assert_eq!(m.total_executions, 3);
        assert_eq!(m.success_count, 2);
        assert_eq!(m.failure_count, 1);
        assert_eq!(m.retry_count, 1);
        assert_eq!(m.network_errors, 1);
        assert_eq!(m.last_execution_ms, Some(300.0));
        assert!((m.avg_execution_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn percentiles_use_floor_index() {
        let collector = NodeMetricsCollector::new();
        for n in 1..=10 {
            collector.record_success("a", ms(n * 10));
        }
        let m = collector.node_metrics("a");
        // floor(0.5 * 9) = 4, floor(0.9 * 9) = 8, floor(0.99 * 9) = 8
        assert_eq!(m.p50, Some(50.0));
        assert_eq!(m.p90, Some(90.0));
        assert_eq!(m.p99, Some(90.0));
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let collector = NodeMetricsCollector::new();
        collector.record_success("a", ms(42));
        let m = collector.node_metrics("a");
        assert_eq!((m.p50, m.p90, m.p99), (Some(42.0), Some(42.0), Some(42.0)));
    }

    #[test]
    fn window_evicts_oldest() {
        let collector = NodeMetricsCollector::with_config(MetricsConfig {
            window_size: 3,
            ..MetricsConfig::default()
        })
        .unwrap();
        for n in [1000, 1, 2, 3] {
            collector.record_success("a", ms(n));
        }
        let m = collector.node_metrics("a");
        assert_eq!(m.p99, Some(2.0));
        assert_eq!(m.total_executions, 4);
    }

    #[test]
    fn error_categories_map_from_classifier() {
        assert_eq!(
            MetricsErrorCategory::from(ErrorCategory::RateLimit),
            MetricsErrorCategory::Other
        );
        assert_eq!(
            MetricsErrorCategory::from(ErrorCategory::Timeout),
            MetricsErrorCategory::Timeout
        );
    }

    #[test]
    fn failure_rate_callback_fires_above_threshold() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let collector = NodeMetricsCollector::with_config(MetricsConfig {
            failure_rate_threshold: Some(0.5),
            ..MetricsConfig::default()
        })
        .unwrap()
        .on_failure_rate_threshold(move |node, rate| {
            assert_eq!(node, "a");
            assert!(rate > 0.5);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        collector.record_success("a", ms(1));
        collector.record_failure("a", ms(1), MetricsErrorCategory::Other);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        collector.record_failure("a", ms(1), MetricsErrorCategory::Other);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn latency_callback_reports_p99() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let collector = NodeMetricsCollector::with_config(MetricsConfig {
            latency_threshold_ms: Some(500.0),
            ..MetricsConfig::default()
        })
        .unwrap()
        .on_latency_threshold(move |_, p99| *sink.lock() = Some(p99));

        collector.record_success("a", ms(100));
        assert_eq!(*seen.lock(), None);
        // floor(0.99 * 1) = 0, so p99 is still 100
        collector.record_success("a", ms(900));
        assert_eq!(*seen.lock(), None);
        collector.record_success("a", ms(900));
        assert_eq!(*seen.lock(), Some(900.0));
    }

    #[test]
    fn reset_one_or_all() {
        let collector = NodeMetricsCollector::new();
        collector.record_success("a", ms(1));
        collector.record_success("b", ms(1));
        collector.reset(Some("a"));
        assert_eq!(collector.all_metrics().len(), 1);
        collector.reset(None);
        assert!(collector.all_metrics().is_empty());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let collector = NodeMetricsCollector::new();
        collector.record_failure("a", ms(5), MetricsErrorCategory::Timeout);
        let json = serde_json::to_value(collector.all_metrics()).unwrap();
        assert_eq!(json["a"]["timeoutErrors"], 1);
        assert_eq!(json["a"]["lastExecutionMs"], 5.0);
        assert!(json["a"]["p50"].is_number());
    }

    #[test]
    fn rejects_invalid_config() {
        assert_eq!(
            NodeMetricsCollector::with_config(MetricsConfig {
                window_size: 0,
                ..MetricsConfig::default()
            })
            .unwrap_err(),
            ConfigError::ZeroWindow
        );
        assert!(
            MetricsConfig {
                failure_rate_threshold: Some(1.5),
                ..MetricsConfig::default()
            }
            .validate()
            .is_err()
        );
    }
}
