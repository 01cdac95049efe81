//! Tests for benchmark statistics

use super::*;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

mod duration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_three_runs() {
        let stats = StatisticsEngine::new().summarize_durations(&[ms(10), ms(20), ms(30)]);
        assert_eq!(stats.avg_execution_time, ms(20));
        assert_eq!(stats.min_execution_time, ms(10));
        assert_eq!(stats.max_execution_time, ms(30));
        assert_eq!(stats.p95_execution_time, ms(30));
        assert_eq!(stats.std_deviation, ms(10));
        assert_eq!(stats.successful_runs, 3);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let engine = StatisticsEngine::new();
        assert_eq!(
            engine.summarize_durations(&[ms(30), ms(10), ms(20)]),
            engine.summarize_durations(&[ms(10), ms(20), ms(30)])
        );
    }

    #[test]
    fn test_single_run_has_zero_deviation() {
        let stats = StatisticsEngine::new().summarize_durations(&[ms(7)]);
        assert_eq!(stats.avg_execution_time, ms(7));
        assert_eq!(stats.p95_execution_time, ms(7));
        assert_eq!(stats.std_deviation, Duration::ZERO);
    }

    #[test]
    fn test_no_runs_is_the_zero_sentinel() {
        let stats = StatisticsEngine::new().summarize_durations(&[]);
        assert_eq!(stats, BenchmarkStatistics::default());
        assert!(!stats.has_samples());
    }

    #[test]
    fn test_mean_uses_integer_nanoseconds() {
        let durations = [Duration::from_nanos(1), Duration::from_nanos(2)];
        assert_eq!(average_duration(&durations), Duration::from_nanos(1));

        let large = [Duration::from_secs(u32::MAX as u64); 4];
        assert_eq!(average_duration(&large), Duration::from_secs(u32::MAX as u64));
    }

    #[rstest::rstest]
    #[case(1, 1)]
    #[case(10, 10)]
    #[case(20, 19)]
    #[case(21, 20)]
    #[case(100, 95)]
    fn test_nearest_rank_p95(#[case] runs: u64, #[case] expected_ms: u64) {
        let sorted: Vec<Duration> = (1..=runs).map(ms).collect();
        assert_eq!(nearest_rank(&sorted, 0.95), ms(expected_ms));
    }
}

mod sample_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_only_successful_samples_count() {
        let samples = vec![
            RunSample::succeeded(0, ms(10)).with_cost(100.0).with_advisor_score(80),
            RunSample::failed(1, ms(500), "connection reset"),
            RunSample::succeeded(2, ms(30)).with_cost(200.0).with_advisor_score(90),
        ];

        let stats = StatisticsEngine::new().compute(&samples);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.avg_execution_time, ms(20));
        assert_eq!(stats.max_execution_time, ms(30));
        assert_eq!(stats.avg_cost, Some(150.0));
        assert_eq!(stats.avg_advisor_score, Some(85.0));
    }

    #[test]
    fn test_averages_skip_samples_without_values() {
        let samples = vec![
            RunSample::succeeded(0, ms(10)).with_cost(40.0),
            RunSample::succeeded(1, ms(10)),
        ];

        let stats = StatisticsEngine::new().compute(&samples);
        assert_eq!(stats.avg_cost, Some(40.0));
        assert_eq!(stats.avg_advisor_score, None);
    }

    #[test]
    fn test_all_failed() {
        let samples: Vec<RunSample> = (0..5)
            .map(|i| RunSample::failed(i, ms(1), "boom"))
            .collect();

        let stats = StatisticsEngine::new().compute(&samples);
        assert_eq!(stats.successful_runs, 0);
        assert_eq!(stats.failed_runs, 5);
        assert_eq!(stats.avg_execution_time, Duration::ZERO);
        assert_eq!(stats.avg_cost, None);
    }
}
