//! Benchmark Runner - repeated, timed query execution
//!
//! Warmup runs execute first and are thrown away. Benchmark runs then execute
//! one after another, each bounded by the configured timeout. A run that fails
//! or times out is recorded and the loop moves on; only the caller decides
//! whether too few runs succeeded.

use crate::config::{BenchmarkConfig, DEFAULT_MAX_RUNS};
use crate::statistics::{BenchmarkStatistics, StatisticsEngine, duration_ms};
use serde::{Deserialize, Serialize};
use sqltrace_analyzer::explain::{PlanTree, parse_explain};
use sqltrace_analyzer::{AdvisorAnalysis, AdvisorEngine, PlanMetrics};
use sqltrace_core::{ExecutionBackend, ExecutionOutput, Result, TraceError};
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Executing,
    Succeeded,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// Outcome of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    /// Zero-based position among the benchmark runs (warmups excluded)
    pub run_index: u32,
    pub state: RunState,
    pub execution_time: Duration,
    pub success: bool,
    pub error: Option<String>,
    /// Largest node cost of the run's plan
    pub cost: Option<f64>,
    pub advisor_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_analysis: Option<AdvisorAnalysis>,
}

impl RunSample {
    pub fn pending(run_index: u32) -> Self {
        Self {
            run_index,
            state: RunState::Pending,
            execution_time: Duration::ZERO,
            success: false,
            error: None,
            cost: None,
            advisor_score: None,
            plan: None,
            advisor_analysis: None,
        }
    }

    /// A finished successful run with the given time
    pub fn succeeded(run_index: u32, execution_time: Duration) -> Self {
        let mut sample = Self::pending(run_index);
        sample.finish(RunState::Succeeded, execution_time, None);
        sample
    }

    /// A finished failed run
    pub fn failed(run_index: u32, execution_time: Duration, error: impl Into<String>) -> Self {
        let mut sample = Self::pending(run_index);
        sample.finish(RunState::Failed, execution_time, Some(error.into()));
        sample
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_advisor_score(mut self, score: u8) -> Self {
        self.advisor_score = Some(score);
        self
    }

    fn finish(&mut self, state: RunState, execution_time: Duration, error: Option<String>) {
        self.state = state;
        self.success = state == RunState::Succeeded;
        self.execution_time = execution_time;
        self.error = error;
    }

    pub fn execution_time_ms(&self) -> f64 {
        duration_ms(self.execution_time)
    }
}

/// Samples and statistics of one benchmarked query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub query: String,
    pub config: BenchmarkConfig,
    pub samples: Vec<RunSample>,
    pub statistics: BenchmarkStatistics,
}

impl BenchmarkResult {
    pub fn successful_samples(&self) -> impl Iterator<Item = &RunSample> {
        self.samples.iter().filter(|s| s.success)
    }

    /// True when some runs failed but at least one succeeded
    pub fn is_degraded(&self) -> bool {
        self.statistics.successful_runs > 0 && self.statistics.failed_runs > 0
    }

    /// Fails with `InsufficientSamples` when no run succeeded
    pub fn into_checked(self, label: &str) -> Result<Self> {
        if self.statistics.successful_runs == 0 {
            return Err(TraceError::InsufficientSamples {
                label: label.to_string(),
                successful_runs: 0,
                attempted_runs: self.samples.len() as u32,
            });
        }
        Ok(self)
    }
}

/// Executes a query repeatedly against an [`ExecutionBackend`]
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    advisor: AdvisorEngine,
    max_runs: u32,
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(BenchmarkConfig::default())
    }
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            advisor: AdvisorEngine::new(),
            max_runs: DEFAULT_MAX_RUNS,
        }
    }

    /// Caps warmup and benchmark runs; larger configs are rejected
    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = max_runs;
        self
    }

    pub fn with_advisor(mut self, advisor: AdvisorEngine) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Runs the warmups and benchmark runs for `query`
    ///
    /// Only an invalid config, including one over the run limit, is an error
    /// here. A result where every run failed is still returned; see
    /// [`BenchmarkResult::into_checked`].
    #[tracing::instrument(skip(self, backend, query), fields(sql_preview = %query.chars().take(100).collect::<String>()))]
    pub async fn run<B>(&self, backend: &B, query: &str) -> Result<BenchmarkResult>
    where
        B: ExecutionBackend + ?Sized,
    {
        self.config.validate_with_limit(self.max_runs)?;

        for warmup in 0..self.config.warmup_runs {
            let sample = self.execute_run(backend, query, warmup).await;
            tracing::trace!(warmup, state = ?sample.state, "warmup run discarded");
        }

        let mut samples = Vec::new();
        for run_index in 0..self.config.benchmark_runs {
            let sample = self.execute_run(backend, query, run_index).await;
            if let Some(error) = &sample.error {
                tracing::warn!(run_index, state = ?sample.state, error = %error, "benchmark run did not succeed");
            }
            samples.push(sample);
        }

        let statistics = StatisticsEngine::new().compute(&samples);
        tracing::info!(
            successful_runs = statistics.successful_runs,
            failed_runs = statistics.failed_runs,
            avg_ms = statistics.avg_ms(),
            "benchmark finished"
        );

        Ok(BenchmarkResult {
            query: query.to_string(),
            config: self.config.clone(),
            samples,
            statistics,
        })
    }

    async fn execute_run<B>(&self, backend: &B, query: &str, run_index: u32) -> RunSample
    where
        B: ExecutionBackend + ?Sized,
    {
        let mut sample = RunSample::pending(run_index);
        sample.state = RunState::Executing;

        let timeout = self.config.timeout();
        let started = Instant::now();
        // The backend future is dropped on expiry
        let outcome = tokio::time::timeout(timeout, backend.execute(query, timeout)).await;
        let wall_clock = started.elapsed();

        match outcome {
            Err(_) => sample.finish(RunState::TimedOut, wall_clock, Some("timeout".into())),
            Ok(Err(error)) => sample.finish(RunState::Failed, wall_clock, Some(error.to_string())),
            Ok(Ok(output)) => {
                let execution_time = output.elapsed.unwrap_or(wall_clock);
                match self.inspect_plan(&output, &mut sample) {
                    Ok(()) => sample.finish(RunState::Succeeded, execution_time, None),
                    Err(error) => {
                        sample.finish(RunState::Failed, execution_time, Some(error.to_string()))
                    }
                }
            }
        }
        sample
    }

    /// Parses the run's plan and records cost, score and the requested artifacts
    fn inspect_plan(&self, output: &ExecutionOutput, sample: &mut RunSample) -> Result<()> {
        if !self.config.parses_plans() {
            return Ok(());
        }

        let plan = parse_explain(output.engine, &output.explain_output)?;
        sample.cost = plan.tree.most_expensive().and_then(|(_, node)| node.total_cost);

        if self.config.include_advisor_analysis {
            let analysis = self
                .advisor
                .analyze(&plan.tree, &PlanMetrics::from_tree(&plan.tree));
            sample.advisor_score = Some(analysis.performance_score);
            sample.advisor_analysis = Some(analysis);
        }
        if self.config.include_execution_plans {
            sample.plan = Some(plan.tree);
        }
        Ok(())
    }
}
