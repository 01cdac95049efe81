//! Advisor rules
//!
//! Each rule looks at one node of a plan tree and may produce one suggestion.
//! A node can trigger several rules.

use crate::advisor::engine::AdvisorConfig;
use crate::advisor::suggestion::{Severity, Suggestion, SuggestionType};
use crate::explain::{NodeKind, PlanNode, PlanTree};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MySQL's list of candidate indexes and the one it chose
const POSSIBLE_KEYS: &str = "possible_keys";
const CHOSEN_KEY: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorRule {
    /// Full scan over many rows without an index condition
    LargeSequentialScan,
    /// Nested loop whose larger input is big
    ExpensiveNestedLoop,
    /// Sort whose run cost outgrows its row count, or that already went to disk
    SortSpillRisk,
    /// Full scan although candidate indexes were listed
    UnusedIndexHint,
    /// Hash or merge join above the join cost threshold
    CostlyJoin,
    /// Node far above the cost threshold that nothing else explains
    ExpensiveOperation,
    /// Most expensive node that nothing else explains
    CostlyNodeWithoutCondition,
}

impl AdvisorRule {
    /// Rules evaluated on every node
    pub const PER_NODE: [Self; 5] = [
        Self::LargeSequentialScan,
        Self::ExpensiveNestedLoop,
        Self::SortSpillRisk,
        Self::UnusedIndexHint,
        Self::CostlyJoin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::LargeSequentialScan => "large_sequential_scan",
            Self::ExpensiveNestedLoop => "expensive_nested_loop",
            Self::SortSpillRisk => "sort_spill_risk",
            Self::UnusedIndexHint => "unused_index_hint",
            Self::CostlyJoin => "costly_join",
            Self::ExpensiveOperation => "expensive_operation",
            Self::CostlyNodeWithoutCondition => "costly_node_without_condition",
        }
    }

    /// Evaluates this rule against the node at `index`
    pub fn evaluate(&self, tree: &PlanTree, index: usize, config: &AdvisorConfig) -> Option<Suggestion> {
        let node = tree.node(index)?;
        match self {
            Self::LargeSequentialScan => large_sequential_scan(node, index, config),
            Self::ExpensiveNestedLoop => expensive_nested_loop(tree, node, index, config),
            Self::SortSpillRisk => sort_spill_risk(node, index, config),
            Self::UnusedIndexHint => unused_index_hint(node, index),
            Self::CostlyJoin => costly_join(node, index, config),
            Self::ExpensiveOperation => expensive_operation(node, index, config),
            Self::CostlyNodeWithoutCondition => costly_node_without_condition(tree, node, index, config),
        }
    }
}

fn large_sequential_scan(node: &PlanNode, index: usize, config: &AdvisorConfig) -> Option<Suggestion> {
    if node.kind() != NodeKind::FullScan || node.has_any_extra(&config.index_condition_keys) {
        return None;
    }

    let rows = match (node.actual_rows, node.total_cost) {
        (Some(rows), _) => rows as f64,
        (None, Some(cost)) => cost * config.estimated_rows_per_cost_unit,
        (None, None) => return None,
    };
    if rows <= config.large_scan_rows as f64 {
        return None;
    }

    let table = relation_label(node);
    let columns = config
        .filter_keys
        .iter()
        .find_map(|key| node.extra_str(key))
        .map(extract_columns_from_filter)
        .unwrap_or_default();

    let description = format!(
        "Full table scan on '{}' reads about {:.0} rows with no index condition",
        table, rows
    );

    let suggestion = if config.enable_index_suggestions {
        let recommendation = if columns.is_empty() {
            format!("Consider adding an index on '{}' for the columns it is filtered by", table)
        } else {
            format!(
                "Consider creating an index: CREATE INDEX idx_{}_{} ON {} ({})",
                table.replace('.', "_"),
                columns.join("_"),
                table,
                columns.join(", ")
            )
        };
        Suggestion::new(
            SuggestionType::MissingIndex,
            Severity::High,
            index,
            format!("Missing index on '{}'", table),
        )
        .with_recommendation(recommendation)
    } else {
        Suggestion::new(
            SuggestionType::SequentialScanLargeTable,
            Severity::High,
            index,
            format!("Sequential scan on large table '{}'", table),
        )
        .with_recommendation("Filter on indexed columns or narrow the scanned range")
    };

    Some(
        suggestion
            .with_description(description)
            .with_impact("High: avoids reading the entire table"),
    )
}

fn expensive_nested_loop(
    tree: &PlanTree,
    node: &PlanNode,
    index: usize,
    config: &AdvisorConfig,
) -> Option<Suggestion> {
    if node.kind() != NodeKind::NestedLoop {
        return None;
    }

    let larger_input = tree
        .children(index)
        .filter_map(|(_, child)| child.actual_rows)
        .max()?;
    if larger_input <= config.nested_loop_rows {
        return None;
    }

    Some(
        Suggestion::new(
            SuggestionType::InefficientJoin,
            Severity::Medium,
            index,
            "Expensive nested loop join",
        )
        .with_description(format!(
            "Nested loop iterates over an input of {} rows",
            larger_input
        ))
        .with_recommendation(
            "Consider adding indexes on join columns or letting the planner choose a hash join",
        )
        .with_impact("Medium: reduces repeated inner lookups"),
    )
}

fn sort_spill_risk(node: &PlanNode, index: usize, config: &AdvisorConfig) -> Option<Suggestion> {
    if node.kind() != NodeKind::Sort {
        return None;
    }

    let on_disk = node
        .extra_str("Sort Method")
        .is_some_and(|method| method.to_lowercase().contains("external"))
        || node
            .extra_str("Sort Space Type")
            .is_some_and(|space| space.eq_ignore_ascii_case("disk"));

    let costly = match (node.run_cost(), sort_rows(node, config)) {
        (Some(run_cost), Some(rows)) => run_cost > config.sort_cost_per_row * rows,
        _ => false,
    };

    if !on_disk && !costly {
        return None;
    }

    let description = if on_disk {
        "Sort exceeded available memory and used disk".to_string()
    } else {
        format!(
            "Sort cost grows faster than its input ({:.2} cost units after the first row)",
            node.run_cost().unwrap_or_default()
        )
    };

    Some(
        Suggestion::new(
            SuggestionType::SortSpillRisk,
            Severity::Medium,
            index,
            "Sort may spill to disk",
        )
        .with_description(description)
        .with_recommendation(
            "Consider an index matching the sort order or raising the sort memory limit",
        )
        .with_impact("Medium: avoids disk-based sorting"),
    )
}

fn sort_rows(node: &PlanNode, config: &AdvisorConfig) -> Option<f64> {
    if let Some(rows) = node.actual_rows {
        return Some(rows as f64);
    }
    config
        .sort_row_keys
        .iter()
        .find_map(|key| node.extra.get(key).and_then(numeric_value))
}

fn unused_index_hint(node: &PlanNode, index: usize) -> Option<Suggestion> {
    if node.kind() != NodeKind::FullScan {
        return None;
    }

    let candidates: Vec<String> = match node.extra.get(POSSIBLE_KEYS)? {
        Value::Array(keys) => keys
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Value::String(keys) => keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case("NULL"))
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };
    let chosen = node.extra.get(CHOSEN_KEY).is_some_and(|key| !key.is_null());
    if candidates.is_empty() || chosen {
        return None;
    }

    Some(
        Suggestion::new(
            SuggestionType::UnusedIndexHint,
            Severity::Low,
            index,
            format!("Index not used on '{}'", relation_label(node)),
        )
        .with_description(format!(
            "Candidate indexes {} were considered but the table was scanned in full",
            candidates.join(", ")
        ))
        .with_recommendation(
            "Check that the filter is sargable and table statistics are current",
        )
        .with_impact("Low: may enable an index lookup"),
    )
}

fn costly_join(node: &PlanNode, index: usize, config: &AdvisorConfig) -> Option<Suggestion> {
    let cost = node.total_cost?;
    if node.kind() != NodeKind::Join || cost <= config.join_cost_threshold {
        return None;
    }

    Some(
        Suggestion::new(
            SuggestionType::InefficientJoin,
            Severity::Medium,
            index,
            format!("Costly {}", node.node_type),
        )
        .with_description(format!(
            "{} is estimated at {:.2} cost units",
            node.node_type, cost
        ))
        .with_recommendation(
            "Consider indexes on the join columns or filtering the inputs before the join",
        )
        .with_impact("Medium: shrinks the join inputs"),
    )
}

fn expensive_operation(node: &PlanNode, index: usize, config: &AdvisorConfig) -> Option<Suggestion> {
    let cost = node.total_cost?;
    if cost <= config.expensive_cost_threshold * config.expensive_operation_factor {
        return None;
    }

    Some(
        Suggestion::new(
            SuggestionType::Other,
            Severity::Medium,
            index,
            format!("Expensive {} Operation", node.node_type),
        )
        .with_description(format!(
            "{} has a total cost of {:.2}",
            node.node_type, cost
        ))
        .with_recommendation("Review whether this operation can be optimized or avoided")
        .with_impact("Medium: the operation dominates the plan cost"),
    )
}

fn costly_node_without_condition(
    tree: &PlanTree,
    node: &PlanNode,
    index: usize,
    config: &AdvisorConfig,
) -> Option<Suggestion> {
    let (most_expensive, _) = tree.most_expensive()?;
    let cost = node.total_cost?;
    if most_expensive != index || cost < config.expensive_cost_threshold || !node.extra.is_empty() {
        return None;
    }

    Some(
        Suggestion::new(
            SuggestionType::Other,
            Severity::Low,
            index,
            format!("Most expensive operation: {}", node.node_type),
        )
        .with_description(format!(
            "{} accounts for the highest cost in the plan ({:.2})",
            node.node_type, cost
        ))
        .with_recommendation("Review whether this operation can be narrowed or avoided")
        .with_impact("Informational"),
    )
}

fn relation_label(node: &PlanNode) -> &str {
    node.relation_name
        .as_deref()
        .or(node.alias.as_deref())
        .unwrap_or("unknown")
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extracts column names from a filter expression (best effort)
pub(crate) fn extract_columns_from_filter(filter: &str) -> Vec<String> {
    let mut columns = Vec::new();

    // Common patterns: column = value, column > value, etc.
    let operators = [
        "<>", "!=", ">=", "<=", "=", ">", "<", " IS ", " LIKE ", " IN ", " ~~ ",
    ];

    for part in filter
        .split(" AND ")
        .flat_map(|p| p.split(" OR "))
        .flat_map(|p| p.split(" and "))
        .flat_map(|p| p.split(" or "))
    {
        let trimmed = part.trim().trim_start_matches('(').trim_end_matches(')');

        let Some(idx) = operators.iter().filter_map(|op| trimmed.find(op)).min() else {
            continue;
        };
        let potential_col = trimmed[..idx].trim();

        // Skip if it looks like a value (starts with quote, number, etc.)
        if potential_col.is_empty()
            || potential_col.starts_with('\'')
            || potential_col.starts_with('"')
            || potential_col.starts_with(|c: char| c.is_ascii_digit())
        {
            continue;
        }

        // "(status)::text" -> "status", "`db`.`users`.`email`" -> "email"
        let without_cast = potential_col.split("::").next().unwrap_or(potential_col);
        let clean = without_cast
            .trim_matches(|c| c == '(' || c == ')')
            .rsplit('.')
            .next()
            .unwrap_or(without_cast)
            .trim_matches(|c| c == '`' || c == '"' || c == '(' || c == ')')
            .to_string();

        if !clean.is_empty() && !columns.contains(&clean) {
            columns.push(clean);
        }
    }

    columns
}
