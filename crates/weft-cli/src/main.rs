use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_core::impls::TracingEventSink;
use weft_core::{
    ConcurrencyManager, ConcurrencyMetrics, ManagerBuilder, ManagerConfig, Pipeline, Priority,
    RetryPolicy, TaskError, TaskSpec, TaskStatus, Work,
};

/// Run a simulated workload through the concurrency manager.
#[derive(Debug, Parser)]
#[command(name = "weft", version, about)]
struct Args {
    /// Maximum number of tasks running at once (overrides the config file)
    #[arg(short = 'c', long, env = "WEFT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Number of simulated tasks
    #[arg(short = 'n', long, default_value_t = 20)]
    tasks: usize,

    /// Probability (0.0 - 1.0) that a task fails its first attempt
    #[arg(long, default_value_t = 0.3)]
    failure_rate: f64,

    /// JSON manager config
    #[arg(long, value_name = "FILE", env = "WEFT_CONFIG")]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Simulated work: sleeps, then fails `remaining_failures` times before
/// succeeding.
struct FlakyWork {
    index: usize,
    duration: Duration,
    remaining_failures: AtomicU32,
}

#[async_trait]
impl Work<usize> for FlakyWork {
    async fn run(&self) -> Result<usize, TaskError> {
        tokio::time::sleep(self.duration).await;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(TaskError::work(format!(
                "intentional failure (left={left})"
            )));
        }
        Ok(self.index)
    }
}

#[derive(Debug, Serialize)]
struct WorkloadSummary {
    submitted: usize,
    completed: usize,
    failed: usize,
    retried: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    workload: WorkloadSummary,
    pipeline: String,
    sum_of_squares: i64,
    race_winner: String,
    metrics: ConcurrencyMetrics,
}

fn workload_specs(count: usize, failure_rate: f64) -> Vec<TaskSpec<usize>> {
    let mut rng = rand::thread_rng();
    let failure_rate = failure_rate.clamp(0.0, 1.0);

    (0..count)
        .map(|index| {
            let priority = Priority::ALL[rng.gen_range(0..Priority::ALL.len())];
            let work = FlakyWork {
                index,
                duration: Duration::from_millis(rng.gen_range(20..200)),
                remaining_failures: AtomicU32::new(u32::from(rng.gen_bool(failure_rate))),
            };
            TaskSpec::new(work)
                .named(format!("sim-{index}"))
                .with_priority(priority)
                .with_retry(RetryPolicy::new(3, Duration::from_millis(50)))
        })
        .collect()
}

async fn run_workload(manager: &ConcurrencyManager, args: &Args) -> WorkloadSummary {
    let specs = workload_specs(args.tasks, args.failure_rate);
    let results = manager.execute_parallel(specs).await;

    WorkloadSummary {
        submitted: results.len(),
        completed: results
            .iter()
            .filter(|r| r.status == TaskStatus::Completed)
            .count(),
        failed: results
            .iter()
            .filter(|r| r.status == TaskStatus::Failed)
            .count(),
        retried: results.iter().filter(|r| r.attempts > 1).count(),
    }
}

async fn run_pipeline(manager: &ConcurrencyManager) -> Result<String> {
    let pipeline = Pipeline::new(TaskSpec::new(|| async {
        "21".parse::<i64>()
            .map_err(|e| TaskError::work(format!("parse: {e}")))
    }))
    .then(|x: i64| async move { Ok::<_, TaskError>(x * 2) })
    .then(|x: i64| async move { Ok::<_, TaskError>(format!("answer={x}")) });

    manager
        .execute_pipeline(pipeline)
        .await
        .context("pipeline failed")
}

async fn run_race(manager: &ConcurrencyManager) -> Result<String> {
    let contender = |name: &'static str, ms: u64| {
        TaskSpec::new(move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, TaskError>(name.to_string())
        })
        .named(name)
        .with_priority(Priority::High)
        .on_cancel(move |task_id| info!(%task_id, contender = name, "race contender cancelled"))
    };

    let winner = manager
        .race(vec![contender("tortoise", 500), contender("hare", 50)])
        .await?;
    Ok(winner.into_result()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ManagerConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }

    let manager = ManagerBuilder::new()
        .config(config)
        .event_sink(Arc::new(TracingEventSink))
        .build()
        .context("invalid manager configuration")?;
    info!(
        max_concurrency = manager.config().max_concurrency,
        tasks = args.tasks,
        "starting simulated workload"
    );

    let workload = run_workload(&manager, &args).await;
    let pipeline = run_pipeline(&manager).await?;
    let sum_of_squares = manager
        .map_reduce(
            (1..=10).collect(),
            |x: i64| async move { Ok::<_, TaskError>(x * x) },
            |values: Vec<i64>| async move { Ok::<_, TaskError>(values.iter().sum::<i64>()) },
        )
        .await?;
    let race_winner = run_race(&manager).await?;
    let metrics = manager.get_metrics().await;

    let report = Report {
        workload,
        pipeline,
        sum_of_squares,
        race_winner,
        metrics,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "workload: {} submitted, {} completed, {} failed, {} needed a retry",
            report.workload.submitted,
            report.workload.completed,
            report.workload.failed,
            report.workload.retried
        );
        println!("pipeline: {}", report.pipeline);
        println!("map/reduce: {}", report.sum_of_squares);
        println!("race winner: {}", report.race_winner);
        println!(
            "metrics: total={} completed={} failed={} cancelled={} avg={:?} throughput={} utilization={:.2}",
            report.metrics.total_tasks,
            report.metrics.completed_tasks,
            report.metrics.failed_tasks,
            report.metrics.cancelled_tasks,
            report.metrics.average_execution_time,
            report.metrics.throughput,
            report.metrics.utilization
        );
    }

    manager.shutdown().await;
    Ok(())
}
