//! Tests for the comparison engine

use super::*;
use crate::statistics::StatisticsEngine;
use std::time::Duration;

fn stats(durations_ms: &[u64]) -> BenchmarkStatistics {
    let durations: Vec<Duration> = durations_ms
        .iter()
        .copied()
        .map(Duration::from_millis)
        .collect();
    StatisticsEngine::new().summarize_durations(&durations)
}

fn compare(a: &BenchmarkStatistics, b: &BenchmarkStatistics) -> ComparisonResult {
    ComparisonEngine::new().compare(a, b, "A", "B").unwrap()
}

mod improvement_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identical_statistics() {
        let a = stats(&[10, 12, 14, 16]);
        let result = compare(&a, &a.clone());

        assert_eq!(result.performance_improvement_percent, 0.0);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::NotSignificant
        );
        assert_eq!(result.metrics.avg_time_diff_ms, 0.0);
        assert_eq!(result.t_statistic, Some(0.0));
        assert!((result.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_faster_b_is_positive_improvement() {
        let a = stats(&[100, 100]);
        let b = stats(&[75, 75]);
        let result = compare(&a, &b);

        assert_eq!(result.performance_improvement_percent, 25.0);
        assert_eq!(result.metrics.avg_time_diff_ms, -25.0);
    }

    #[test]
    fn test_zero_baseline_gives_zero_improvement() {
        let a = stats(&[0]);
        let b = stats(&[5]);
        assert_eq!(compare(&a, &b).performance_improvement_percent, 0.0);
    }

    #[test]
    fn test_cost_and_score_differences() {
        let mut a = stats(&[10]);
        let mut b = stats(&[10]);
        a.avg_cost = Some(500.0);
        b.avg_cost = Some(120.0);
        a.avg_advisor_score = Some(60.0);

        let metrics = compare(&a, &b).metrics;
        assert_eq!(metrics.cost_diff, Some(-380.0));
        assert_eq!(metrics.advisor_score_diff, None);
    }
}

mod significance_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_spread_on_either_side_is_inconclusive() {
        let a = stats(&[10, 10, 10]);
        let b = stats(&[20, 20, 20]);
        let result = compare(&a, &b);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.t_statistic, None);
        assert_eq!(result.degrees_of_freedom, None);
        assert_eq!(result.metrics.confidence_interval_ms, None);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::NotSignificant
        );
        assert_eq!(result.performance_improvement_percent, -100.0);
    }

    #[test]
    fn test_single_runs_are_never_significant() {
        let a = StatisticsEngine::new().summarize_durations(&[Duration::from_micros(10_000)]);
        let b = StatisticsEngine::new().summarize_durations(&[Duration::from_micros(10_001)]);
        let result = compare(&a, &b);

        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.t_statistic, None);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::NotSignificant
        );
        assert!((result.metrics.avg_time_diff_ms - 0.001).abs() < 1e-9);
    }

    #[rstest::rstest]
    #[case(&[10], &[50, 52, 48, 51, 49])]
    #[case(&[100, 102, 98, 101, 99], &[50])]
    fn test_one_run_side_is_inconclusive(#[case] a_ms: &[u64], #[case] b_ms: &[u64]) {
        let result = compare(&stats(a_ms), &stats(b_ms));
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.degrees_of_freedom, None);
        assert_eq!(result.metrics.confidence_interval_ms, None);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::NotSignificant
        );
    }

    #[test]
    fn test_two_runs_per_side_is_enough() {
        let a = stats(&[100, 104]);
        let b = stats(&[50, 54]);
        let result = compare(&a, &b);
        assert!((result.degrees_of_freedom.unwrap() - 2.0).abs() < 1e-9);
        assert!(result.p_value < 0.01, "p = {}", result.p_value);
    }

    #[test]
    fn test_clearly_different_samples() {
        let a = stats(&[100, 102, 98, 101, 99]);
        let b = stats(&[50, 52, 48, 51, 49]);
        let result = compare(&a, &b);

        assert!(result.p_value < 0.01, "p = {}", result.p_value);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::HighlySignificant
        );
        let (low, high) = result.metrics.confidence_interval_ms.unwrap();
        assert!(low < -50.0 + 5.0 && high > -50.0 - 5.0);
        assert!(high < 0.0);
    }

    #[test]
    fn test_overlapping_samples() {
        let a = stats(&[10, 30, 20, 25, 15]);
        let b = stats(&[12, 28, 22, 18, 24]);
        let result = compare(&a, &b);

        assert!(result.p_value > 0.10, "p = {}", result.p_value);
        assert_eq!(
            result.statistical_significance,
            StatisticalSignificance::NotSignificant
        );
        let (low, high) = result.metrics.confidence_interval_ms.unwrap();
        assert!(low < 0.0 && high > 0.0);
    }

    #[test]
    fn test_welch_degrees_of_freedom() {
        // Equal variances and sizes give n_a + n_b - 2
        let a = stats(&[10, 20, 30]);
        let b = stats(&[20, 30, 40]);
        let result = compare(&a, &b);
        assert!((result.degrees_of_freedom.unwrap() - 4.0).abs() < 1e-9);
        assert!((result.t_statistic.unwrap() + 10.0 / (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[rstest::rstest]
    #[case(0.001, StatisticalSignificance::HighlySignificant)]
    #[case(0.01, StatisticalSignificance::Significant)]
    #[case(0.049, StatisticalSignificance::Significant)]
    #[case(0.05, StatisticalSignificance::MarginallySignificant)]
    #[case(0.099, StatisticalSignificance::MarginallySignificant)]
    #[case(0.10, StatisticalSignificance::NotSignificant)]
    #[case(1.0, StatisticalSignificance::NotSignificant)]
    fn test_default_buckets(#[case] p_value: f64, #[case] expected: StatisticalSignificance) {
        assert_eq!(SignificanceThresholds::default().classify(p_value), expected);
    }

    #[test]
    fn test_custom_cutoffs() {
        let thresholds = SignificanceThresholds {
            highly_significant: 0.001,
            significant: 0.01,
            marginally_significant: 0.05,
        };
        assert_eq!(
            thresholds.classify(0.02),
            StatisticalSignificance::MarginallySignificant
        );
    }
}

mod insufficient_samples_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_the_empty_side() {
        let a = stats(&[10, 20]);
        let mut b = stats(&[]);
        b.failed_runs = 5;

        let err = ComparisonEngine::new()
            .compare(&a, &b, "baseline", "candidate")
            .unwrap_err();
        match err {
            TraceError::InsufficientSamples {
                label,
                successful_runs,
                attempted_runs,
            } => {
                assert_eq!(label, "candidate");
                assert_eq!(successful_runs, 0);
                assert_eq!(attempted_runs, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
