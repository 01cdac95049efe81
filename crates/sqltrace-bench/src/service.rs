//! Trace service
//!
//! Entry point for the explain, benchmark and compare operations.

use crate::comparison::{ComparisonEngine, ComparisonResult};
use crate::config::BenchmarkConfig;
use crate::runner::{BenchmarkResult, BenchmarkRunner};
use crate::settings::TraceSettings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqltrace_analyzer::explain::{NormalizedPlan, parse_explain};
use sqltrace_analyzer::{AdvisorAnalysis, AdvisorEngine, PlanMetrics};
use sqltrace_core::{ExecutionBackend, Result, TraceError};
use std::time::Duration;

/// Plan, metrics and advice for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainOutcome {
    pub plan: NormalizedPlan,
    pub metrics: PlanMetrics,
    pub advisor_analysis: AdvisorAnalysis,
}

/// Both benchmarks of a comparison and their comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub result_a: BenchmarkResult,
    pub result_b: BenchmarkResult,
    pub comparison: ComparisonResult,
}

/// Service for plan analysis and benchmarking
///
/// Handles:
/// - Single-shot explain with advice
/// - Repeated-run benchmarks
/// - Concurrent benchmarking and comparison of two queries
pub struct TraceService<B> {
    backend: B,
    advisor: AdvisorEngine,
    comparison: ComparisonEngine,
    default_config: BenchmarkConfig,
    explain_timeout: Duration,
    max_runs: u32,
}

impl<B: ExecutionBackend> TraceService<B> {
    /// Create a service with default settings
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, TraceSettings::default())
    }

    pub fn with_settings(backend: B, settings: TraceSettings) -> Self {
        Self {
            backend,
            advisor: AdvisorEngine::with_config(settings.advisor),
            comparison: ComparisonEngine::with_thresholds(settings.significance),
            default_config: settings.benchmark,
            explain_timeout: Duration::from_secs(settings.explain_timeout_seconds),
            max_runs: settings.max_runs,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Benchmark config used when a request does not carry one
    pub fn default_config(&self) -> &BenchmarkConfig {
        &self.default_config
    }

    /// Execute a query once and analyze its plan
    ///
    /// A timeout is fatal here.
    #[tracing::instrument(skip(self, query), fields(sql_preview = %query.chars().take(100).collect::<String>()))]
    pub async fn explain(&self, query: &str) -> Result<ExplainOutcome> {
        let output = tokio::time::timeout(
            self.explain_timeout,
            self.backend.execute(query, self.explain_timeout),
        )
        .await
        .map_err(|_| {
            tracing::error!(seconds = self.explain_timeout.as_secs(), "explain timed out");
            TraceError::Timeout {
                seconds: self.explain_timeout.as_secs(),
            }
        })??;

        let plan = parse_explain(output.engine, &output.explain_output).map_err(|e| {
            tracing::error!(error = %e, "failed to parse EXPLAIN output");
            e
        })?;
        let metrics = PlanMetrics::from_tree(&plan.tree);
        let advisor_analysis = self.advisor.analyze(&plan.tree, &metrics);

        tracing::info!(
            nodes = metrics.node_count,
            performance_score = advisor_analysis.performance_score,
            "query explained"
        );
        Ok(ExplainOutcome {
            plan,
            metrics,
            advisor_analysis,
        })
    }

    /// Benchmark a query; fails when no run succeeds
    pub async fn benchmark(&self, query: &str, config: &BenchmarkConfig) -> Result<BenchmarkResult> {
        self.runner(config)
            .run(&self.backend, query)
            .await?
            .into_checked("query")
    }

    /// Benchmark two queries concurrently and compare them
    #[tracing::instrument(skip(self, query_a, query_b, config))]
    pub async fn compare(
        &self,
        query_a: &str,
        query_b: &str,
        label_a: &str,
        label_b: &str,
        config: &BenchmarkConfig,
    ) -> Result<ComparisonReport> {
        let runner = self.runner(config);
        let (result_a, result_b) = tokio::join!(
            runner.run(&self.backend, query_a),
            runner.run(&self.backend, query_b),
        );
        let result_a = result_a?.into_checked(label_a)?;
        let result_b = result_b?.into_checked(label_b)?;

        let comparison =
            self.comparison
                .compare(&result_a.statistics, &result_b.statistics, label_a, label_b)?;
        Ok(ComparisonReport {
            result_a,
            result_b,
            comparison,
        })
    }

    /// Benchmark named queries one after another, keeping their order
    pub async fn benchmark_suite(
        &self,
        queries: &IndexMap<String, String>,
        config: &BenchmarkConfig,
    ) -> Result<IndexMap<String, BenchmarkResult>> {
        let runner = self.runner(config);
        let mut results = IndexMap::with_capacity(queries.len());
        for (name, query) in queries {
            let result = runner.run(&self.backend, query).await?.into_checked(name)?;
            results.insert(name.clone(), result);
        }
        Ok(results)
    }

    fn runner(&self, config: &BenchmarkConfig) -> BenchmarkRunner {
        BenchmarkRunner::new(config.clone())
            .with_advisor(self.advisor.clone())
            .with_max_runs(self.max_runs)
    }
}
