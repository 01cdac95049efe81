//! Advisor Engine - rule evaluation, ordering and scoring

use crate::advisor::rules::AdvisorRule;
use crate::advisor::suggestion::{
    AdvisorAnalysis, AnalysisSummary, Severity, Suggestion, SuggestionType, potential_improvement,
};
use crate::explain::PlanTree;
use crate::metrics::PlanMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Configuration for the advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Rows above which a full scan is flagged
    pub large_scan_rows: u64,
    /// Row estimate per unit of cost, used when a scan reports no actual rows
    pub estimated_rows_per_cost_unit: f64,
    /// Extra keys whose presence means a scan is already index-assisted
    pub index_condition_keys: Vec<String>,
    /// Extra keys holding a scan's filter expression
    pub filter_keys: Vec<String>,
    /// Input rows above which a nested loop is flagged
    pub nested_loop_rows: u64,
    /// Run cost per row above which a sort is considered at risk of spilling
    pub sort_cost_per_row: f64,
    /// Extra keys holding a row estimate when a sort reports no actual rows
    pub sort_row_keys: Vec<String>,
    /// Minimum cost for the most expensive node to be reported on its own
    pub expensive_cost_threshold: f64,
    /// Multiple of `expensive_cost_threshold` above which any unexplained node is reported
    pub expensive_operation_factor: f64,
    /// Cost above which a hash or merge join is flagged
    pub join_cost_threshold: f64,
    /// Report large scans as missing indexes rather than plain large scans
    pub enable_index_suggestions: bool,
    pub high_penalty: u8,
    pub medium_penalty: u8,
    pub low_penalty: u8,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            large_scan_rows: 10_000,
            estimated_rows_per_cost_unit: 50.0,
            index_condition_keys: vec![
                "Index Cond".into(),
                "Recheck Cond".into(),
                "index_condition".into(),
            ],
            filter_keys: vec!["Filter".into(), "attached_condition".into()],
            nested_loop_rows: 1_000,
            sort_cost_per_row: 0.1,
            sort_row_keys: vec![
                "Plan Rows".into(),
                "rows_examined_per_scan".into(),
                "rows".into(),
            ],
            expensive_cost_threshold: 1_000.0,
            expensive_operation_factor: 2.0,
            join_cost_threshold: 1_000.0,
            enable_index_suggestions: true,
            high_penalty: 20,
            medium_penalty: 10,
            low_penalty: 5,
        }
    }
}

impl AdvisorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the large scan row threshold
    pub fn with_large_scan_rows(mut self, rows: u64) -> Self {
        self.large_scan_rows = rows;
        self
    }

    pub fn with_estimated_rows_per_cost_unit(mut self, factor: f64) -> Self {
        self.estimated_rows_per_cost_unit = factor.max(0.0);
        self
    }

    pub fn with_index_condition_keys(mut self, keys: Vec<String>) -> Self {
        self.index_condition_keys = keys;
        self
    }

    /// Sets the nested loop row threshold
    pub fn with_nested_loop_rows(mut self, rows: u64) -> Self {
        self.nested_loop_rows = rows;
        self
    }

    pub fn with_sort_cost_per_row(mut self, cost: f64) -> Self {
        self.sort_cost_per_row = cost.max(0.0);
        self
    }

    pub fn with_expensive_cost_threshold(mut self, cost: f64) -> Self {
        self.expensive_cost_threshold = cost;
        self
    }

    pub fn with_expensive_operation_factor(mut self, factor: f64) -> Self {
        self.expensive_operation_factor = factor.max(0.0);
        self
    }

    pub fn with_join_cost_threshold(mut self, cost: f64) -> Self {
        self.join_cost_threshold = cost;
        self
    }

    /// Sets whether to suggest indexes
    pub fn with_index_suggestions(mut self, enabled: bool) -> Self {
        self.enable_index_suggestions = enabled;
        self
    }

    /// Sets the score penalties for high, medium and low severity
    pub fn with_penalties(mut self, high: u8, medium: u8, low: u8) -> Self {
        self.high_penalty = high;
        self.medium_penalty = medium;
        self.low_penalty = low;
        self
    }

    pub fn penalty(&self, severity: Severity) -> u8 {
        match severity {
            Severity::High => self.high_penalty,
            Severity::Medium => self.medium_penalty,
            Severity::Low => self.low_penalty,
        }
    }
}

/// Stateless rule-based plan advisor
#[derive(Debug, Clone, Default)]
pub struct AdvisorEngine {
    config: AdvisorConfig,
}

impl AdvisorEngine {
    /// Creates a new advisor with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new advisor with custom config
    pub fn with_config(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Analyzes a plan tree and its metrics
    pub fn analyze(&self, tree: &PlanTree, metrics: &PlanMetrics) -> AdvisorAnalysis {
        let mut suggestions: Vec<Suggestion> = Vec::new();
        let mut seen: HashSet<(SuggestionType, usize)> = HashSet::new();
        let mut position = vec![usize::MAX; tree.len()];

        for (order, (index, _)) in tree.iter_pre_order().enumerate() {
            position[index] = order;
            for rule in AdvisorRule::PER_NODE {
                if let Some(suggestion) = rule.evaluate(tree, index, &self.config)
                    && seen.insert((suggestion.suggestion_type, index))
                {
                    suggestions.push(suggestion);
                }
            }
        }

        // Cost-only rules speak for nodes no other rule explains
        let explained: HashSet<usize> = suggestions.iter().map(|s| s.node_index).collect();
        for (index, _) in tree.iter_pre_order() {
            if !explained.contains(&index)
                && let Some(suggestion) =
                    AdvisorRule::ExpensiveOperation.evaluate(tree, index, &self.config)
                && seen.insert((suggestion.suggestion_type, index))
            {
                suggestions.push(suggestion);
            }
        }

        if let Some((index, _)) = tree.most_expensive()
            && !suggestions.iter().any(|s| s.node_index == index)
            && let Some(suggestion) =
                AdvisorRule::CostlyNodeWithoutCondition.evaluate(tree, index, &self.config)
            && seen.insert((suggestion.suggestion_type, index))
        {
            suggestions.push(suggestion);
        }

        suggestions.sort_by_key(|s| {
            (
                s.severity.rank(),
                position.get(s.node_index).copied().unwrap_or(usize::MAX),
            )
        });

        let performance_score = self.score(&suggestions);
        let summary = AnalysisSummary {
            total_suggestions: suggestions.len(),
            high_severity_count: suggestions.iter().filter(|s| s.severity.is_high()).count(),
            total_cost: metrics.max_total_cost,
            most_expensive_operation: tree.most_expensive().map(|(_, node)| node.node_type.clone()),
            potential_improvement: potential_improvement(performance_score).to_string(),
        };

        tracing::debug!(
            nodes = tree.len(),
            suggestions = suggestions.len(),
            performance_score,
            "plan analyzed"
        );

        AdvisorAnalysis {
            suggestions,
            performance_score,
            summary,
        }
    }

    /// Analyzes a plan tree, computing its metrics first
    pub fn analyze_tree(&self, tree: &PlanTree) -> AdvisorAnalysis {
        self.analyze(tree, &PlanMetrics::from_tree(tree))
    }

    /// 100 minus the severity penalties, floored at 0
    pub fn score(&self, suggestions: &[Suggestion]) -> u8 {
        let penalty: u32 = suggestions
            .iter()
            .map(|s| u32::from(self.config.penalty(s.severity)))
            .sum();
        100u32.saturating_sub(penalty) as u8
    }
}
