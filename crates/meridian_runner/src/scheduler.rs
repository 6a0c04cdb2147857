//! Bounded-concurrency plan execution.
//!
//! [`PlanScheduler::execute`] walks a [`Plan`] and runs every node through a
//! shared [`NodeRunner`]. At most `max_concurrency` nodes are in flight; a
//! node keeps its slot while it sleeps between retries. A node starts once
//! all of its dependencies have succeeded. When a node fails, everything
//! downstream of it is skipped; once the cancellation signal fires, no new
//! node starts and the ones that never ran are reported as cancelled.

use core::future::Future;
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use hashbrown::HashMap;
use meridian_errors::NodeError;
use tokio::time::Instant;
use tracing::Instrument;

use crate::cancel::CancellationSignal;
use crate::config::ConfigError;
use crate::plan::{Plan, PlanNode};
use crate::runner::{NodeRunner, RunOptions};

/// Final status of one node in a plan run.
#[derive(Debug, Clone)]
pub enum NodeStatus {
    /// The node completed.
    Succeeded,
    /// The node failed with this terminal error.
    Failed(NodeError),
    /// The run was cancelled before the node completed.
    Cancelled,
    /// The node never ran because an upstream node failed.
    Skipped {
        /// The failed node that blocked this one.
        blocked_by: String,
    },
}

impl NodeStatus {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed(_) => "failed",
            NodeStatus::Cancelled => "cancelled",
            NodeStatus::Skipped { .. } => "skipped",
        }
    }

    /// Returns `true` for [`NodeStatus::Succeeded`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Succeeded)
    }
}

/// Outcome of a plan run.
#[derive(Debug, Clone)]
pub struct PlanReport<T> {
    /// Identifier of this run, attached to the run's tracing span.
    pub run_id: String,
    /// Status of every node, keyed by name.
    pub outcomes: BTreeMap<String, NodeStatus>,
    /// Values produced by succeeded nodes.
    pub outputs: BTreeMap<String, T>,
    /// Wall time of the whole run.
    pub duration: Duration,
}

impl<T> PlanReport<T> {
    /// Returns `true` if every node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(NodeStatus::is_success)
    }

    /// Status of one node.
    #[must_use]
    pub fn status(&self, node_name: &str) -> Option<&NodeStatus> {
        self.outcomes.get(node_name)
    }

    /// Names of nodes whose status has the given name, e.g. `"failed"`.
    pub fn nodes_with_status<'a>(&'a self, status: &'a str) -> impl Iterator<Item = &'a str> {
        self.outcomes
            .iter()
            .filter(move |(_, s)| s.as_str() == status)
            .map(|(name, _)| name.as_str())
    }
}

/// Runs plans through a [`NodeRunner`] with a concurrency bound.
#[derive(Debug, Clone)]
pub struct PlanScheduler {
    runner: NodeRunner,
    max_concurrency: usize,
    node_options: HashMap<String, RunOptions>,
}

impl PlanScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroConcurrency`] if `max_concurrency` is zero.
    pub fn new(runner: NodeRunner, max_concurrency: usize) -> Result<Self, ConfigError> {
        if max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self {
            runner,
            max_concurrency,
            node_options: HashMap::new(),
        })
    }

    /// Overrides the runner's options for one node, e.g. to give a model
    /// call a longer timeout than the rest of the plan.
    #[must_use]
    pub fn with_node_options(mut self, node_name: impl Into<String>, options: RunOptions) -> Self {
        self.node_options.insert(node_name.into(), options);
        self
    }

    /// The runner shared by every node.
    #[must_use]
    pub fn runner(&self) -> &NodeRunner {
        &self.runner
    }

    /// The concurrency bound.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs every node of `plan`, calling `work` for each attempt.
    ///
    /// Node failures do not abort the run; they are reported per node.
    pub async fn execute<T, E, F, Fut>(
        &self,
        plan: &Plan,
        signal: &CancellationSignal,
        work: F,
    ) -> PlanReport<T>
    where
        F: Fn(&PlanNode) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        let run_id = nanoid::nanoid!();
        let span = tracing::info_span!("plan", run_id = %run_id, nodes = plan.len());
        let (outcomes, outputs, duration) = self.drive(plan, signal, &work).instrument(span).await;
        PlanReport {
            run_id,
            outcomes,
            outputs,
            duration,
        }
    }

    async fn drive<T, E, F, Fut>(
        &self,
        plan: &Plan,
        signal: &CancellationSignal,
        work: &F,
    ) -> (BTreeMap<String, NodeStatus>, BTreeMap<String, T>, Duration)
    where
        F: Fn(&PlanNode) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        let started = Instant::now();
        let nodes = plan.nodes();
        let mut statuses: Vec<Option<NodeStatus>> = vec![None; nodes.len()];
        let mut outputs = BTreeMap::new();
        let mut waiting: Vec<usize> = (0..nodes.len()).map(|i| plan.dependency_count(i)).collect();
        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| waiting[i] == 0).collect();
        let mut in_flight = FuturesUnordered::new();

        tracing::info!(max_concurrency = self.max_concurrency, "plan started");

        loop {
            while in_flight.len() < self.max_concurrency {
                let Some(i) = ready.pop_front() else {
                    break;
                };
                if signal.is_fired() {
                    statuses[i] = Some(NodeStatus::Cancelled);
                    block_downstream(plan, i, &mut statuses, || NodeStatus::Cancelled);
                    continue;
                }
                let node = &nodes[i];
                let options = self.options_for(&node.name);
                in_flight.push(async move {
                    let result = self
                        .runner
                        .run_with(&node.name, &options, signal, || work(node))
                        .await;
                    (i, result)
                });
            }

            let Some((i, result)) = in_flight.next().await else {
                break;
            };
            let name = &nodes[i].name;
            match result {
                Ok(value) => {
                    outputs.insert(name.clone(), value);
                    statuses[i] = Some(NodeStatus::Succeeded);
                    for &next in plan.dependent_indices(i) {
                        waiting[next] -= 1;
                        if waiting[next] == 0 && statuses[next].is_none() {
                            ready.push_back(next);
                        }
                    }
                }
                Err(err) if err.is_cancellation() => {
                    statuses[i] = Some(NodeStatus::Cancelled);
                    block_downstream(plan, i, &mut statuses, || NodeStatus::Cancelled);
                }
                Err(err) => {
                    statuses[i] = Some(NodeStatus::Failed(err));
                    block_downstream(plan, i, &mut statuses, || NodeStatus::Skipped {
                        blocked_by: name.clone(),
                    });
                }
            }
        }

        let outcomes: BTreeMap<String, NodeStatus> = nodes
            .iter()
            .zip(statuses)
            .map(|(node, status)| (node.name.clone(), status.unwrap_or(NodeStatus::Cancelled)))
            .collect();

        let count = |kind: &str| outcomes.values().filter(|s| s.as_str() == kind).count();
        tracing::info!(
            succeeded = count("succeeded"),
            failed = count("failed"),
            skipped = count("skipped"),
            cancelled = count("cancelled"),
            "plan finished"
        );

        (outcomes, outputs, started.elapsed())
    }

    fn options_for(&self, node_name: &str) -> RunOptions {
        self.node_options
            .get(node_name)
            .copied()
            .unwrap_or_else(|| RunOptions::from(self.runner.config()))
    }
}

/// Gives every not-yet-decided node downstream of `root` the status built by
/// `status`.
fn block_downstream(
    plan: &Plan,
    root: usize,
    statuses: &mut [Option<NodeStatus>],
    status: impl Fn() -> NodeStatus,
) {
    let mut stack: Vec<usize> = plan.dependent_indices(root).to_vec();
    while let Some(i) = stack.pop() {
        if statuses[i].is_some() {
            continue;
        }
        statuses[i] = Some(status());
        stack.extend_from_slice(plan.dependent_indices(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use meridian_surface::Surface;

    fn scheduler(max: usize) -> PlanScheduler {
        let runner = NodeRunner::new(RunnerConfig::default().with_max_retries(0)).unwrap();
        PlanScheduler::new(runner, max).unwrap()
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let runner = NodeRunner::new(RunnerConfig::default()).unwrap();
        assert_eq!(
            PlanScheduler::new(runner, 0).unwrap_err(),
            ConfigError::ZeroConcurrency
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_plan_succeeds() {
        let plan = Plan::new(Vec::new()).unwrap();
        let report = scheduler(2)
            .execute(&plan, &CancellationSignal::new(), |_| async {
                Ok::<_, NodeError>(())
            })
            .await;
        assert!(report.is_success());
        assert!(report.outcomes.is_empty());
        assert!(!report.run_id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn collects_outputs_by_name() {
        let plan = Plan::new(vec![
            PlanNode::new("a", Surface::Backend),
            PlanNode::new("b", Surface::Frontend).after("a"),
        ])
        .unwrap();
        let report = scheduler(1)
            .execute(&plan, &CancellationSignal::new(), |node| {
                let name = node.name.clone();
                async move { Ok::<_, NodeError>(name.len()) }
            })
            .await;
        assert!(report.is_success());
        assert_eq!(report.outputs["a"], 1);
        assert_eq!(report.nodes_with_status("succeeded").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failure_skips_downstream() {
        let plan = Plan::new(vec![
            PlanNode::new("schema", Surface::Database),
            PlanNode::new("api", Surface::Backend).after("schema"),
            PlanNode::new("ui", Surface::Frontend).after("api"),
            PlanNode::new("docs", Surface::Packages),
        ])
        .unwrap();
        let report = scheduler(4)
            .execute(&plan, &CancellationSignal::new(), |node| {
                let fail = node.name == "schema";
                async move {
                    if fail {
                        Err(NodeError::from(meridian_errors::ValidationError::single(
                            "columns", "missing",
                        )))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(matches!(report.status("schema"), Some(NodeStatus::Failed(_))));
        for name in ["api", "ui"] {
            assert!(matches!(
                report.status(name),
                Some(NodeStatus::Skipped { blocked_by }) if blocked_by == "schema"
            ));
        }
        assert!(report.status("docs").unwrap().is_success());
        assert!(!report.is_success());
    }
}
