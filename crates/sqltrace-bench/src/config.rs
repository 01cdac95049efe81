//! Benchmark configuration

use serde::{Deserialize, Serialize};
use sqltrace_core::{Result, TraceError};
use std::time::Duration;

/// Default cap on `warmup_runs` and `benchmark_runs`
pub const DEFAULT_MAX_RUNS: u32 = 1_000;

/// Configuration for one benchmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Runs executed first and discarded
    pub warmup_runs: u32,
    /// Timed runs, at least one
    pub benchmark_runs: u32,
    /// Per-run timeout, at least one second
    pub timeout_seconds: u64,
    /// Keep each run's normalized plan
    pub include_execution_plans: bool,
    /// Run the advisor over each run's plan
    pub include_advisor_analysis: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_runs: 2,
            benchmark_runs: 5,
            timeout_seconds: 30,
            include_execution_plans: true,
            include_advisor_analysis: true,
        }
    }
}

impl BenchmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warmup_runs(mut self, runs: u32) -> Self {
        self.warmup_runs = runs;
        self
    }

    pub fn with_benchmark_runs(mut self, runs: u32) -> Self {
        self.benchmark_runs = runs;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_execution_plans(mut self, enabled: bool) -> Self {
        self.include_execution_plans = enabled;
        self
    }

    pub fn with_advisor_analysis(mut self, enabled: bool) -> Self {
        self.include_advisor_analysis = enabled;
        self
    }

    /// Per-run timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Whether runs need their EXPLAIN output parsed
    pub fn parses_plans(&self) -> bool {
        self.include_execution_plans || self.include_advisor_analysis
    }

    /// Validates against [`DEFAULT_MAX_RUNS`]
    pub fn validate(&self) -> Result<()> {
        self.validate_with_limit(DEFAULT_MAX_RUNS)
    }

    /// Validates the config, allowing at most `max_runs` warmup and benchmark runs each
    pub fn validate_with_limit(&self, max_runs: u32) -> Result<()> {
        if self.benchmark_runs == 0 {
            return Err(TraceError::Configuration(
                "benchmark_runs must be at least 1".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(TraceError::Configuration(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        for (field, runs) in [
            ("warmup_runs", self.warmup_runs),
            ("benchmark_runs", self.benchmark_runs),
        ] {
            if runs > max_runs {
                return Err(TraceError::Configuration(format!(
                    "{field} must be at most {max_runs}, got {runs}"
                )));
            }
        }
        Ok(())
    }
}
