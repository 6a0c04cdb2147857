//! Example plan runner CLI.
//!
//! Runs a plan with simulated node work and prints one line per node.
//! Ctrl-C cancels the run; nodes that have not finished report `cancelled`.
//!
//! # Usage
//!
//! ```bash
//! plan-runner [plan.json]
//! ```
//!
//! Without an argument the built-in demo plan runs. The environment (or a
//! `.env` file) may set:
//!
//! - `MERIDIAN_PRESET`: `default`, `simple`, `llm` or `tool` (default `simple`)
//! - `MERIDIAN_CONCURRENCY`: maximum concurrent nodes (default 3)
//! - `RUST_LOG`: tracing filter, e.g. `meridian_runner=debug`

use core::time::Duration;
use std::path::PathBuf;
use std::sync::Arc;

use example::{DemoError, PlanFile, Simulation, preset, summarize};
use meridian_core::{TracingConfig, TracingFormat};
use meridian_runner::{
    CancellationSignal, NodeMetricsCollector, NodeRunner, PlanReport, PlanScheduler,
};

const DEFAULT_CONCURRENCY: usize = 3;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let mut logging = TracingConfig::default().with_format(TracingFormat::Compact);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        logging = logging.with_env_filter(filter);
    }
    logging.init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    match run(path).await {
        Ok(report) if report.is_success() => print_summary(&report),
        Ok(report) => {
            print_summary(&report);
            std::process::exit(1);
        }
        Err(e) => {
            print_error(&e);
            std::process::exit(2);
        }
    }
}

async fn run(path: Option<PathBuf>) -> Result<PlanReport<String>, DemoError> {
    let file = match path {
        Some(path) => PlanFile::load(&path)?,
        None => PlanFile::demo(),
    };
    let plan = file.plan()?;

    let config = preset(&std::env::var("MERIDIAN_PRESET").unwrap_or_else(|_| "simple".into()))?;
    let concurrency = std::env::var("MERIDIAN_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY);

    let metrics = Arc::new(
        NodeMetricsCollector::new()
            .on_failure_rate_threshold(|node, rate| {
                tracing::warn!(node, rate, "node failure rate above threshold");
            })
            .on_latency_threshold(|node, p99| {
                tracing::warn!(node, p99_ms = p99, "node p99 latency above threshold");
            }),
    );
    let runner = NodeRunner::new(config)?.with_metrics(Arc::clone(&metrics));
    let scheduler = PlanScheduler::new(runner, concurrency)?;

    let signal = CancellationSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling plan");
            trigger.fire();
        }
    });

    let simulation = Simulation::new(&file, Duration::from_millis(200));
    let report = scheduler
        .execute(&plan, &signal, |node| {
            simulation.perform(node.name.clone(), node.surface)
        })
        .await;

    for (name, m) in metrics.all_metrics() {
        tracing::info!(
            node = %name,
            successes = m.success_count,
            failures = m.failure_count,
            retries = m.retry_count,
            "node metrics"
        );
    }
    Ok(report)
}

#[expect(clippy::print_stdout, reason = "the per-node summary is the program's output")]
fn print_summary(report: &PlanReport<String>) {
    println!("run {} finished in {:?}", report.run_id, report.duration);
    for line in summarize(report) {
        println!("  {line}");
    }
}

#[expect(clippy::print_stderr, reason = "setup errors go to stderr before exiting")]
fn print_error(err: &DemoError) {
    eprintln!("Error: {err}");
}
