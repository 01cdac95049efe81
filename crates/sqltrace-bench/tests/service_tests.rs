//! Integration tests for TraceService
//!
//! Drives explain, benchmark and compare through a scripted backend and checks
//! the results and the error bodies callers see.

mod common;

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use sqltrace_analyzer::SuggestionType;
use sqltrace_bench::{
    BenchmarkConfig, BenchmarkRequest, CompareRequest, ExplainRequest, RunState,
    StatisticalSignificance, TraceService, TraceSettings,
};
use sqltrace_core::logging::init_test_logging;
use sqltrace_core::{Engine, TraceError};
use std::sync::Arc;
use std::time::Duration;

use common::{MockBackend, MockReply, index_scan_plan, postgres_backend};

fn quick_config(runs: u32) -> BenchmarkConfig {
    BenchmarkConfig::new()
        .with_warmup_runs(1)
        .with_benchmark_runs(runs)
        .with_timeout_seconds(5)
}

// ============ Explain ============

#[tokio::test]
async fn explain_parses_plan_and_advises_index() {
    init_test_logging();
    let service = TraceService::new(postgres_backend());

    let outcome = service
        .explain("SELECT * FROM users WHERE email = 'a@b.c'")
        .await
        .expect("should explain");

    assert_eq!(outcome.plan.engine, Engine::Postgres);
    assert_eq!(outcome.plan.execution_time_ms, Some(180.5));
    assert_eq!(outcome.metrics.node_count, 1);
    assert_eq!(outcome.metrics.max_total_cost, 9500.0);

    let analysis = &outcome.advisor_analysis;
    assert_eq!(analysis.performance_score, 80);
    assert_eq!(analysis.suggestions.len(), 1);
    assert_eq!(
        analysis.suggestions[0].suggestion_type,
        SuggestionType::MissingIndex
    );
    assert_eq!(
        analysis.suggestions[0].recommendation,
        "Consider creating an index: CREATE INDEX idx_users_email ON users (email)"
    );
    assert_eq!(service.backend().execute_count(), 1);
}

#[tokio::test]
async fn explain_of_clean_plan_scores_full_marks() {
    let backend = postgres_backend().with_default_output(index_scan_plan());
    let service = TraceService::new(backend);

    let outcome = service.explain("SELECT 1").await.unwrap();
    assert!(outcome.advisor_analysis.suggestions.is_empty());
    assert_eq!(outcome.advisor_analysis.performance_score, 100);
    assert_eq!(
        outcome.advisor_analysis.summary.potential_improvement,
        "Query appears well optimized"
    );
}

#[tokio::test(start_paused = true)]
async fn explain_timeout_is_fatal() {
    let backend =
        postgres_backend().with_response("pg_sleep", MockReply::Delay(Duration::from_secs(120)));
    let settings = TraceSettings {
        explain_timeout_seconds: 3,
        ..Default::default()
    };
    let service = TraceService::with_settings(backend, settings);

    let err = service.explain("SELECT pg_sleep(120)").await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, TraceError::Timeout { seconds: 3 }));
}

#[tokio::test]
async fn explain_execution_error_is_passed_through() {
    let backend = postgres_backend()
        .with_failure("missing_table", "relation \"missing_table\" does not exist");
    let service = TraceService::new(backend);

    let err = service.explain("SELECT * FROM missing_table").await.unwrap_err();
    assert_eq!(err.kind(), "execution_error");
}

#[tokio::test]
async fn explain_of_garbage_is_a_parse_error() {
    let backend = MockBackend::new(Engine::Mysql).with_default_output("{\"query_block\": 42");
    let service = TraceService::new(backend);

    let err = service.explain("SELECT 1").await.unwrap_err();
    assert_eq!(err.kind(), "parse_error");
}

// ============ Benchmark ============

#[tokio::test]
async fn benchmark_runs_warmups_and_benchmark_runs() {
    let service = TraceService::new(postgres_backend());

    let result = service
        .benchmark("SELECT * FROM users", &quick_config(4))
        .await
        .unwrap();

    assert_eq!(service.backend().execute_count(), 5);
    assert_eq!(result.samples.len(), 4);
    assert_eq!(result.statistics.successful_runs, 4);
    assert_eq!(result.statistics.avg_execution_time, Duration::from_millis(5));
    assert_eq!(result.statistics.std_deviation, Duration::ZERO);
    assert_eq!(result.statistics.avg_cost, Some(9500.0));
    assert_eq!(result.statistics.avg_advisor_score, Some(80.0));
}

#[tokio::test]
async fn benchmark_with_no_successful_run_fails() {
    let backend = postgres_backend().with_failure("broken", "connection refused");
    let service = TraceService::new(backend);

    let err = service
        .benchmark("SELECT broken", &quick_config(5))
        .await
        .unwrap_err();
    match err {
        TraceError::InsufficientSamples {
            label,
            successful_runs,
            attempted_runs,
        } => {
            assert_eq!(label, "query");
            assert_eq!(successful_runs, 0);
            assert_eq!(attempted_runs, 5);
        }
        other => panic!("expected InsufficientSamples, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn benchmark_with_every_run_timing_out_fails() {
    let backend =
        postgres_backend().with_response("slow", MockReply::Delay(Duration::from_secs(60)));
    let service = TraceService::new(backend);
    let config = quick_config(2).with_warmup_runs(0).with_timeout_seconds(1);

    let err = service.benchmark("SELECT slow", &config).await.unwrap_err();
    assert_eq!(err.kind(), "insufficient_samples");
}

#[tokio::test]
async fn benchmark_rejects_invalid_config() {
    let service = TraceService::new(postgres_backend());
    let config = quick_config(3).with_timeout_seconds(0);

    let err = service.benchmark("SELECT 1", &config).await.unwrap_err();
    assert_eq!(err.kind(), "configuration_error");
    assert_eq!(service.backend().execute_count(), 0);
}

#[tokio::test]
async fn benchmark_suite_keeps_query_order() {
    let backend = postgres_backend()
        .with_timing("orders", Duration::from_millis(40))
        .with_timing("users", Duration::from_millis(10));
    let service = TraceService::new(backend);

    let mut queries = IndexMap::new();
    queries.insert("orders_by_day".to_string(), "SELECT * FROM orders".to_string());
    queries.insert("active_users".to_string(), "SELECT * FROM users".to_string());

    let results = service
        .benchmark_suite(&queries, &quick_config(2).with_warmup_runs(0))
        .await
        .unwrap();

    assert_eq!(
        results.keys().cloned().collect::<Vec<_>>(),
        vec!["orders_by_day".to_string(), "active_users".to_string()]
    );
    assert_eq!(
        results["orders_by_day"].statistics.avg_execution_time,
        Duration::from_millis(40)
    );
    assert_eq!(
        service.backend().query_log(),
        vec![
            "SELECT * FROM orders",
            "SELECT * FROM orders",
            "SELECT * FROM users",
            "SELECT * FROM users",
        ]
    );
}

#[tokio::test]
async fn benchmark_suite_names_the_failing_query() {
    let backend = postgres_backend().with_failure("missing", "relation does not exist");
    let service = TraceService::new(backend);

    let mut queries = IndexMap::new();
    queries.insert("ok".to_string(), "SELECT 1".to_string());
    queries.insert("broken".to_string(), "SELECT * FROM missing".to_string());

    let err = service
        .benchmark_suite(&queries, &quick_config(2))
        .await
        .unwrap_err();
    assert!(matches!(err, TraceError::InsufficientSamples { ref label, .. } if label == "broken"));
}

// ============ Compare ============

#[tokio::test]
async fn compare_reports_faster_candidate() {
    init_test_logging();
    let backend = postgres_backend()
        .with_timing("/* baseline */", Duration::from_millis(100))
        .with_timing("/* candidate */", Duration::from_millis(75));
    let service = TraceService::new(backend);

    let report = service
        .compare(
            "SELECT /* baseline */ * FROM users",
            "SELECT /* candidate */ * FROM users",
            "baseline",
            "candidate",
            &quick_config(3),
        )
        .await
        .unwrap();

    let comparison = &report.comparison;
    assert_eq!(comparison.label_a, "baseline");
    assert_eq!(comparison.label_b, "candidate");
    assert_eq!(comparison.performance_improvement_percent, 25.0);
    assert_eq!(comparison.metrics.avg_time_diff_ms, -25.0);
    assert_eq!(comparison.metrics.cost_diff, Some(0.0));
    // Constant timings have no spread to test against
    assert_eq!(comparison.p_value, 1.0);
    assert_eq!(comparison.t_statistic, None);
    assert_eq!(
        comparison.statistical_significance,
        StatisticalSignificance::NotSignificant
    );
    assert_eq!(report.result_a.samples.len(), 3);
    assert_eq!(report.result_b.samples.len(), 3);
    assert_eq!(service.backend().execute_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn compare_runs_both_benchmarks_concurrently() {
    let backend = postgres_backend()
        .with_response("/* a */", MockReply::Delay(Duration::from_secs(1)))
        .with_response("/* b */", MockReply::Delay(Duration::from_secs(1)));
    let service = TraceService::new(backend);
    let config = quick_config(2).with_warmup_runs(0);

    let started = tokio::time::Instant::now();
    service
        .compare("SELECT /* a */ 1", "SELECT /* b */ 1", "a", "b", &config)
        .await
        .unwrap();

    // Two one-second runs per side; run back to back this would take four
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn compare_names_the_side_without_samples() {
    let backend = postgres_backend().with_failure("broken_view", "permission denied");
    let service = TraceService::new(backend);

    let err = service
        .compare(
            "SELECT * FROM users",
            "SELECT * FROM broken_view",
            "Query A",
            "Query B",
            &quick_config(3),
        )
        .await
        .unwrap_err();
    match err {
        TraceError::InsufficientSamples {
            label,
            attempted_runs,
            ..
        } => {
            assert_eq!(label, "Query B");
            assert_eq!(attempted_runs, 3);
        }
        other => panic!("expected InsufficientSamples, got {other}"),
    }
}

#[tokio::test]
async fn compare_accepts_a_shared_backend() {
    let backend = Arc::new(postgres_backend());
    let service = TraceService::new(Arc::clone(&backend));

    let report = service
        .compare("SELECT 1", "SELECT 2", "a", "b", &quick_config(2))
        .await
        .unwrap();
    assert_eq!(report.comparison.performance_improvement_percent, 0.0);
    assert_eq!(backend.execute_count(), 6);
}

// ============ Request handlers ============

#[tokio::test]
async fn handle_benchmark_uses_default_config() {
    let settings = TraceSettings {
        benchmark: quick_config(3).with_warmup_runs(0),
        ..Default::default()
    };
    let service = TraceService::with_settings(postgres_backend(), settings);

    let response = service
        .handle_benchmark(BenchmarkRequest {
            query: "SELECT * FROM users".to_string(),
            config: None,
        })
        .await;

    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result.samples.len(), 3);
    assert!(result.samples.iter().all(|s| s.state == RunState::Succeeded));
}

#[tokio::test]
async fn handle_explain_reports_errors_in_body() {
    let backend = postgres_backend().with_failure("nope", "syntax error at or near \"nope\"");
    let service = TraceService::new(backend);

    let response = service
        .handle_explain(ExplainRequest {
            query: "nope".to_string(),
        })
        .await;

    assert!(response.explain.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.kind, "execution_error");
    assert_eq!(error.successful_runs, None);
}

#[tokio::test]
async fn handle_compare_reports_insufficient_samples() {
    let backend = postgres_backend().with_failure("broken", "boom");
    let service = TraceService::new(backend);

    let response = service
        .handle_compare(CompareRequest {
            query_a: "SELECT broken".to_string(),
            query_b: "SELECT 1".to_string(),
            label_a: "old".to_string(),
            label_b: "new".to_string(),
            config: Some(quick_config(2)),
        })
        .await;

    assert!(response.report.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.kind, "insufficient_samples");
    assert_eq!(error.successful_runs, Some(0));
    assert!(error.message.contains("'old'"));
}

#[tokio::test]
async fn handle_json_round_trip() {
    let service = TraceService::new(postgres_backend());

    let body = r#"{"query_a": "SELECT 1", "query_b": "SELECT 2",
        "config": {"warmup_runs": 0, "benchmark_runs": 2}}"#;
    let response = service.handle_json("compare", body).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&response).unwrap();

    assert_eq!(value["error"], serde_json::Value::Null);
    assert_eq!(value["report"]["comparison"]["label_a"], "Query A");
    assert_eq!(value["report"]["comparison"]["label_b"], "Query B");
    assert_eq!(
        value["report"]["result_a"]["samples"].as_array().map(Vec::len),
        Some(2)
    );
}

#[tokio::test]
async fn handle_json_rejects_unknown_operation_and_bad_body() {
    let service = TraceService::new(postgres_backend());

    let err = service.handle_json("profile", "{}").await.unwrap_err();
    assert_eq!(err.kind(), "configuration_error");

    let err = service.handle_json("explain", "{\"sql\": 1}").await.unwrap_err();
    assert_eq!(err.kind(), "serialization_error");
    assert_eq!(service.backend().execute_count(), 0);
}

#[tokio::test]
async fn handle_json_rejects_oversized_run_counts() {
    let service = TraceService::new(postgres_backend());

    let body = r#"{"query": "SELECT 1", "config": {"benchmark_runs": 4294967295}}"#;
    let response = service.handle_json("benchmark", body).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&response).unwrap();

    assert_eq!(value["result"], serde_json::Value::Null);
    assert_eq!(value["error"]["kind"], "configuration_error");
    assert_eq!(service.backend().execute_count(), 0);
}

#[tokio::test]
async fn settings_run_limit_reaches_the_runner() {
    let settings = TraceSettings {
        max_runs: 2,
        ..Default::default()
    };
    let service = TraceService::with_settings(postgres_backend(), settings);

    let err = service
        .benchmark("SELECT 1", &quick_config(3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "configuration_error");
    assert!(service.benchmark("SELECT 1", &quick_config(2)).await.is_ok());
}
