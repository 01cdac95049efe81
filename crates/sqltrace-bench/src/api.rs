//! Request and response types for the explain, benchmark and compare calls
//!
//! Every response carries either a payload or an error body. A benchmark
//! where some runs failed still carries its payload; only a fatal error
//! leaves the payload empty.

use crate::config::BenchmarkConfig;
use crate::runner::BenchmarkResult;
use crate::service::{ComparisonReport, ExplainOutcome, TraceService};
use serde::{Deserialize, Serialize};
use sqltrace_core::{ExecutionBackend, Result, TraceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explain: Option<ExplainOutcome>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub query: String,
    /// Omitted fields take their defaults
    #[serde(default)]
    pub config: Option<BenchmarkConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResponse {
    pub result: Option<BenchmarkResult>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    pub query_a: String,
    pub query_b: String,
    #[serde(default = "default_label_a")]
    pub label_a: String,
    #[serde(default = "default_label_b")]
    pub label_b: String,
    #[serde(default)]
    pub config: Option<BenchmarkConfig>,
}

fn default_label_a() -> String {
    "Query A".to_string()
}

fn default_label_b() -> String {
    "Query B".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub report: Option<ComparisonReport>,
    pub error: Option<ErrorBody>,
}

/// Serializable form of a [`TraceError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_runs: Option<u32>,
}

impl From<&TraceError> for ErrorBody {
    fn from(error: &TraceError) -> Self {
        let successful_runs = match error {
            TraceError::InsufficientSamples {
                successful_runs, ..
            } => Some(*successful_runs),
            _ => None,
        };
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            successful_runs,
        }
    }
}

/// Splits a result into payload and error body
fn split<T>(result: Result<T>) -> (Option<T>, Option<ErrorBody>) {
    match result {
        Ok(value) => (Some(value), None),
        Err(error) => {
            tracing::warn!(kind = error.kind(), error = %error, "request failed");
            (None, Some(ErrorBody::from(&error)))
        }
    }
}

impl From<Result<ExplainOutcome>> for ExplainResponse {
    fn from(result: Result<ExplainOutcome>) -> Self {
        let (explain, error) = split(result);
        Self { explain, error }
    }
}

impl From<Result<BenchmarkResult>> for BenchmarkResponse {
    fn from(result: Result<BenchmarkResult>) -> Self {
        let (result, error) = split(result);
        Self { result, error }
    }
}

impl From<Result<ComparisonReport>> for CompareResponse {
    fn from(result: Result<ComparisonReport>) -> Self {
        let (report, error) = split(result);
        Self { report, error }
    }
}

impl<B: ExecutionBackend> TraceService<B> {
    pub async fn handle_explain(&self, request: ExplainRequest) -> ExplainResponse {
        self.explain(&request.query).await.into()
    }

    pub async fn handle_benchmark(&self, request: BenchmarkRequest) -> BenchmarkResponse {
        let config = request
            .config
            .unwrap_or_else(|| self.default_config().clone());
        self.benchmark(&request.query, &config).await.into()
    }

    pub async fn handle_compare(&self, request: CompareRequest) -> CompareResponse {
        let config = request
            .config
            .unwrap_or_else(|| self.default_config().clone());
        self.compare(
            &request.query_a,
            &request.query_b,
            &request.label_a,
            &request.label_b,
            &config,
        )
        .await
        .into()
    }

    /// Decodes a JSON request, runs it and encodes the response
    pub async fn handle_json(&self, operation: &str, body: &str) -> Result<String> {
        let response = match operation {
            "explain" => {
                let request: ExplainRequest = serde_json::from_str(body)?;
                serde_json::to_string(&self.handle_explain(request).await)?
            }
            "benchmark" => {
                let request: BenchmarkRequest = serde_json::from_str(body)?;
                serde_json::to_string(&self.handle_benchmark(request).await)?
            }
            "compare" => {
                let request: CompareRequest = serde_json::from_str(body)?;
                serde_json::to_string(&self.handle_compare(request).await)?
            }
            other => {
                return Err(TraceError::Configuration(format!(
                    "unknown operation '{other}'"
                )));
            }
        };
        Ok(response)
    }
}
