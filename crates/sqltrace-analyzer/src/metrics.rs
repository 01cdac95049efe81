//! Plan Metrics - whole-plan summary figures
//!
//! Fields a node does not report are skipped, never counted as zero. When no
//! node reports a field the aggregate is 0.

use crate::explain::PlanTree;
use serde::{Deserialize, Serialize};

/// Summary metrics for a whole plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Largest `total_cost` of any node
    pub max_total_cost: f64,
    /// Sum of `actual_total_time` over all nodes, in milliseconds
    pub total_actual_time_ms: f64,
    /// Sum of `actual_rows` over all nodes
    pub total_actual_rows: u64,
    pub node_count: usize,
}

impl PlanMetrics {
    /// Aggregates metrics over every node of `tree`
    pub fn from_tree(tree: &PlanTree) -> Self {
        tree.nodes()
            .iter()
            .fold(Self::default(), |mut metrics, node| {
                if let Some(cost) = node.total_cost {
                    metrics.max_total_cost = metrics.max_total_cost.max(cost);
                }
                if let Some(time) = node.actual_total_time {
                    metrics.total_actual_time_ms += time;
                }
                if let Some(rows) = node.actual_rows {
                    metrics.total_actual_rows = metrics.total_actual_rows.saturating_add(rows);
                }
                metrics.node_count += 1;
                metrics
            })
    }
}

/// Shorthand for [`PlanMetrics::from_tree`]
pub fn aggregate(tree: &PlanTree) -> PlanMetrics {
    PlanMetrics::from_tree(tree)
}
