//! SQLTrace Bench - repeated-run benchmarking and query comparison
//!
//! This crate provides functionality for:
//! - Running a query many times under a per-run timeout
//! - Reducing the runs to timing statistics
//! - Comparing two benchmarks with Welch's t-test
//! - The explain, benchmark and compare service calls with JSON request types
//! - Loading settings from TOML

pub mod api;
pub mod comparison;
pub mod config;
pub mod distribution;
pub mod runner;
pub mod service;
pub mod settings;
pub mod statistics;

pub use api::{
    BenchmarkRequest, BenchmarkResponse, CompareRequest, CompareResponse, ErrorBody,
    ExplainRequest, ExplainResponse,
};
pub use comparison::{
    ComparisonEngine, ComparisonMetrics, ComparisonResult, SignificanceThresholds,
    StatisticalSignificance,
};
pub use config::BenchmarkConfig;
pub use runner::{BenchmarkResult, BenchmarkRunner, RunSample, RunState};
pub use service::{ComparisonReport, ExplainOutcome, TraceService};
pub use settings::TraceSettings;
pub use statistics::{BenchmarkStatistics, StatisticsEngine};
