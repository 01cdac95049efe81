//! Statistics Engine - reduces run samples to timing statistics
//!
//! Only successful samples contribute. Durations are averaged in integer
//! nanoseconds; the standard deviation is the sample (N-1) deviation and the
//! 95th percentile uses the nearest-rank method.

use crate::runner::RunSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of the successful runs of one benchmark
///
/// With no successful runs every duration is zero and `successful_runs` is 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStatistics {
    pub avg_execution_time: Duration,
    pub min_execution_time: Duration,
    pub max_execution_time: Duration,
    pub p95_execution_time: Duration,
    pub std_deviation: Duration,
    pub successful_runs: u32,
    pub failed_runs: u32,
    /// Mean plan cost over the runs that reported one
    pub avg_cost: Option<f64>,
    /// Mean advisor score over the runs that reported one
    pub avg_advisor_score: Option<f64>,
}

impl BenchmarkStatistics {
    pub fn avg_ms(&self) -> f64 {
        duration_ms(self.avg_execution_time)
    }

    pub fn std_deviation_ms(&self) -> f64 {
        duration_ms(self.std_deviation)
    }

    pub fn has_samples(&self) -> bool {
        self.successful_runs > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsEngine;

impl StatisticsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Computes statistics over the successful samples; the rest count as failed
    pub fn compute(&self, samples: &[RunSample]) -> BenchmarkStatistics {
        let successful: Vec<&RunSample> = samples.iter().filter(|s| s.success).collect();
        let durations: Vec<Duration> = successful.iter().map(|s| s.execution_time).collect();

        BenchmarkStatistics {
            failed_runs: (samples.len() - successful.len()) as u32,
            avg_cost: mean(successful.iter().filter_map(|s| s.cost)),
            avg_advisor_score: mean(
                successful
                    .iter()
                    .filter_map(|s| s.advisor_score.map(f64::from)),
            ),
            ..self.summarize_durations(&durations)
        }
    }

    /// Computes the timing fields over bare durations
    pub fn summarize_durations(&self, durations: &[Duration]) -> BenchmarkStatistics {
        if durations.is_empty() {
            return BenchmarkStatistics::default();
        }

        let mut sorted = durations.to_vec();
        sorted.sort();
        let avg = average_duration(&sorted);

        BenchmarkStatistics {
            avg_execution_time: avg,
            min_execution_time: sorted[0],
            max_execution_time: sorted[sorted.len() - 1],
            p95_execution_time: nearest_rank(&sorted, 0.95),
            std_deviation: std_deviation(&sorted, avg),
            successful_runs: sorted.len() as u32,
            ..BenchmarkStatistics::default()
        }
    }
}

/// Mean in exact integer nanoseconds, truncated
pub fn average_duration(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    nanos_to_duration(total / durations.len() as u128)
}

/// Sample standard deviation (N-1), zero for fewer than two values
pub fn std_deviation(durations: &[Duration], mean: Duration) -> Duration {
    if durations.len() < 2 {
        return Duration::ZERO;
    }
    let mean = mean.as_nanos() as f64;
    let variance = durations
        .iter()
        .map(|d| {
            let diff = d.as_nanos() as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / (durations.len() - 1) as f64;

    Duration::from_nanos(variance.sqrt().round() as u64)
}

/// Nearest-rank percentile of already sorted durations
pub fn nearest_rank(sorted: &[Duration], percentile: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (percentile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::new(
        (nanos / 1_000_000_000) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}

pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests;
