//! Example plan runner built with Meridian.
//!
//! Loads a plan, either from a JSON file or the built-in demo, and runs every
//! node through a [`PlanScheduler`]. Node work is simulated: nodes named in
//! the file's `flaky` map fail with a transient network error that many times
//! before succeeding, and nodes listed in `broken` fail validation outright.
//!
//! # Plan file
//!
//! ```json
//! {
//!   "nodes": [
//!     { "name": "schema", "surface": "db" },
//!     { "name": "api", "surface": "backend", "dependsOn": ["schema"] }
//!   ],
//!   "flaky": { "api": 1 },
//!   "broken": []
//! }
//! ```
//!
//! Surfaces may use either the canonical or the compact spelling.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use meridian_errors::{NodeError, ValidationError};
use meridian_runner::{
    ConfigError, NodeStatus, Plan, PlanError, PlanNode, PlanReport, RunnerConfig,
};
use meridian_surface::Surface;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while preparing a run.
#[derive(Debug, Error)]
pub enum DemoError {
    /// The plan file could not be read.
    #[error("failed to read plan file: {0}")]
    Io(#[from] std::io::Error),
    /// The plan file is not valid JSON for a plan.
    #[error("invalid plan file: {0}")]
    Parse(#[from] serde_json::Error),
    /// The plan's dependency graph is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// The runner configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// `MERIDIAN_PRESET` named no known preset.
    #[error("unknown runner preset '{0}' (expected simple, llm, tool or default)")]
    UnknownPreset(String),
}

/// A plan plus the failures to simulate while running it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFile {
    /// Nodes of the plan.
    pub nodes: Vec<PlanNode>,
    /// Transient failures to inject before each named node succeeds.
    #[serde(default)]
    pub flaky: HashMap<String, u32>,
    /// Nodes that always fail validation.
    #[serde(default)]
    pub broken: Vec<String>,
}

impl PlanFile {
    /// A six-node plan across every layer, with one flaky and one broken node.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            nodes: vec![
                PlanNode::new("schema", Surface::Database),
                PlanNode::new("contracts", Surface::Contracts),
                PlanNode::new("api", Surface::Backend)
                    .after("schema")
                    .after("contracts"),
                PlanNode::new("components", Surface::Ui),
                PlanNode::new("pages", Surface::Frontend)
                    .after("api")
                    .after("components"),
                PlanNode::new("deploy", Surface::Infrastructure).after("pages"),
            ],
            flaky: HashMap::from([("api".to_string(), 2)]),
            broken: vec!["components".to_string()],
        }
    }

    /// Parses a plan file.
    pub fn from_json(json: &str) -> Result<Self, DemoError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a plan file from disk.
    pub fn load(path: &std::path::Path) -> Result<Self, DemoError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Validates the dependency graph.
    pub fn plan(&self) -> Result<Plan, DemoError> {
        Ok(Plan::new(self.nodes.clone())?)
    }
}

/// Looks up a runner preset by name.
pub fn preset(name: &str) -> Result<RunnerConfig, DemoError> {
    match name {
        "default" => Ok(RunnerConfig::default()),
        "simple" => Ok(RunnerConfig::simple()),
        "llm" => Ok(RunnerConfig::llm()),
        "tool" => Ok(RunnerConfig::tool()),
        other => Err(DemoError::UnknownPreset(other.to_string())),
    }
}

/// Simulated node work driven by a [`PlanFile`]'s failure settings.
#[derive(Debug)]
pub struct Simulation {
    remaining_failures: HashMap<String, AtomicU32>,
    broken: Vec<String>,
    step: Duration,
}

impl Simulation {
    /// Creates a simulation where every attempt takes `step`.
    #[must_use]
    pub fn new(file: &PlanFile, step: Duration) -> Self {
        Self {
            remaining_failures: file
                .flaky
                .iter()
                .map(|(name, count)| (name.clone(), AtomicU32::new(*count)))
                .collect(),
            broken: file.broken.clone(),
            step,
        }
    }

    /// Performs one attempt of a node.
    pub async fn perform(&self, name: String, surface: Surface) -> Result<String, NodeError> {
        tokio::time::sleep(self.step).await;

        if self.broken.contains(&name) {
            let issue = ValidationError::single(format!("{name}.input"), "missing required field");
            return Err(issue.into());
        }
        let injected = self
            .remaining_failures
            .get(&name)
            .is_some_and(|left| {
                left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            });
        if injected {
            return Err(NodeError::network("ECONNRESET"));
        }
        Ok(format!("{surface} changes applied"))
    }
}

/// Renders one line per node: name, status and detail.
#[must_use]
pub fn summarize(report: &PlanReport<String>) -> Vec<String> {
    report
        .outcomes
        .iter()
        .map(|(name, status)| {
            let detail = match status {
                NodeStatus::Succeeded => {
                    report.outputs.get(name).cloned().unwrap_or_default()
                }
                NodeStatus::Failed(err) => format!("[{}] {err}", err.code()),
                NodeStatus::Skipped { blocked_by } => {
                    format!("blocked by {blocked_by}")
                }
                NodeStatus::Cancelled => String::new(),
            };
            format!("{name:<12} {:<10} {detail}", status.as_str())
        })
        .collect()
}
