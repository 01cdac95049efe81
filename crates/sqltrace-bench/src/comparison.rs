//! Comparison Engine - relative improvement and Welch's t-test
//!
//! Times are compared in milliseconds. The significance test does not assume
//! equal variances; degrees of freedom come from the Welch-Satterthwaite
//! approximation and the p-value is two-tailed. A side with fewer than two
//! runs, or two sides that both have no spread, is never significant.

use crate::distribution::{student_t_two_tailed, t_critical};
use crate::statistics::BenchmarkStatistics;
use serde::{Deserialize, Serialize};
use sqltrace_core::{Result, TraceError};

/// p-value cutoffs for the significance buckets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceThresholds {
    pub highly_significant: f64,
    pub significant: f64,
    pub marginally_significant: f64,
}

impl Default for SignificanceThresholds {
    fn default() -> Self {
        Self {
            highly_significant: 0.01,
            significant: 0.05,
            marginally_significant: 0.10,
        }
    }
}

impl SignificanceThresholds {
    pub fn classify(&self, p_value: f64) -> StatisticalSignificance {
        if p_value < self.highly_significant {
            StatisticalSignificance::HighlySignificant
        } else if p_value < self.significant {
            StatisticalSignificance::Significant
        } else if p_value < self.marginally_significant {
            StatisticalSignificance::MarginallySignificant
        } else {
            StatisticalSignificance::NotSignificant
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticalSignificance {
    NotSignificant,
    MarginallySignificant,
    Significant,
    HighlySignificant,
}

impl StatisticalSignificance {
    pub fn is_significant(&self) -> bool {
        matches!(self, Self::Significant | Self::HighlySignificant)
    }
}

/// Differences between two benchmarks, B minus A
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub avg_time_diff_ms: f64,
    pub cost_diff: Option<f64>,
    pub advisor_score_diff: Option<f64>,
    /// 95% confidence interval of the mean difference, present when the t-test ran
    pub confidence_interval_ms: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub label_a: String,
    pub label_b: String,
    pub metrics: ComparisonMetrics,
    /// Positive when B is faster than A
    pub performance_improvement_percent: f64,
    pub statistical_significance: StatisticalSignificance,
    /// Absent when either side has fewer than two runs or neither side varies
    pub t_statistic: Option<f64>,
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
}

/// Outcome of the two-sample test
#[derive(Debug, Clone, Copy, PartialEq)]
struct WelchTest {
    t_statistic: Option<f64>,
    degrees_of_freedom: Option<f64>,
    p_value: f64,
    standard_error: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine {
    thresholds: SignificanceThresholds,
}

impl ComparisonEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: SignificanceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SignificanceThresholds {
        &self.thresholds
    }

    /// Compares benchmark A (baseline) with benchmark B
    pub fn compare(
        &self,
        a: &BenchmarkStatistics,
        b: &BenchmarkStatistics,
        label_a: impl Into<String>,
        label_b: impl Into<String>,
    ) -> Result<ComparisonResult> {
        let label_a = label_a.into();
        let label_b = label_b.into();
        ensure_samples(a, &label_a)?;
        ensure_samples(b, &label_b)?;

        let mean_a = a.avg_ms();
        let mean_b = b.avg_ms();
        let performance_improvement_percent = improvement_percent(a, b);

        let test = welch_test(a, b);
        let confidence_interval_ms = test.degrees_of_freedom.map(|df| {
            let margin = t_critical(df, 0.05) * test.standard_error;
            let diff = mean_b - mean_a;
            (diff - margin, diff + margin)
        });

        let statistical_significance = self.thresholds.classify(test.p_value);
        tracing::debug!(
            label_a = %label_a,
            label_b = %label_b,
            improvement = performance_improvement_percent,
            p_value = test.p_value,
            significance = ?statistical_significance,
            "benchmarks compared"
        );

        Ok(ComparisonResult {
            label_a,
            label_b,
            metrics: ComparisonMetrics {
                avg_time_diff_ms: mean_b - mean_a,
                cost_diff: a.avg_cost.zip(b.avg_cost).map(|(a, b)| b - a),
                advisor_score_diff: a
                    .avg_advisor_score
                    .zip(b.avg_advisor_score)
                    .map(|(a, b)| b - a),
                confidence_interval_ms,
            },
            performance_improvement_percent,
            statistical_significance,
            t_statistic: test.t_statistic,
            degrees_of_freedom: test.degrees_of_freedom,
            p_value: test.p_value,
        })
    }
}

fn ensure_samples(stats: &BenchmarkStatistics, label: &str) -> Result<()> {
    if stats.has_samples() {
        return Ok(());
    }
    Err(TraceError::InsufficientSamples {
        label: label.to_string(),
        successful_runs: 0,
        attempted_runs: stats.failed_runs,
    })
}

/// (A - B) / A as a percentage, 0 when A is 0
fn improvement_percent(a: &BenchmarkStatistics, b: &BenchmarkStatistics) -> f64 {
    let avg_a = a.avg_execution_time.as_nanos() as f64;
    let avg_b = b.avg_execution_time.as_nanos() as f64;
    if avg_a == 0.0 {
        return 0.0;
    }
    (avg_a - avg_b) / avg_a * 100.0
}

/// Test that never claims a difference
const INCONCLUSIVE: WelchTest = WelchTest {
    t_statistic: None,
    degrees_of_freedom: None,
    p_value: 1.0,
    standard_error: 0.0,
};

fn welch_test(a: &BenchmarkStatistics, b: &BenchmarkStatistics) -> WelchTest {
    // Sample variance is undefined for a single run
    if a.successful_runs < 2 || b.successful_runs < 2 {
        return INCONCLUSIVE;
    }

    let (n_a, n_b) = (f64::from(a.successful_runs), f64::from(b.successful_runs));
    let var_a = a.std_deviation_ms().powi(2) / n_a;
    let var_b = b.std_deviation_ms().powi(2) / n_b;
    let se_squared = var_a + var_b;
    if se_squared <= 0.0 {
        return INCONCLUSIVE;
    }

    let df = se_squared * se_squared / (var_a * var_a / (n_a - 1.0) + var_b * var_b / (n_b - 1.0));
    let standard_error = se_squared.sqrt();
    let t = (a.avg_ms() - b.avg_ms()) / standard_error;

    WelchTest {
        t_statistic: Some(t),
        degrees_of_freedom: Some(df),
        p_value: student_t_two_tailed(t, df),
        standard_error,
    }
}

#[cfg(test)]
mod tests;
