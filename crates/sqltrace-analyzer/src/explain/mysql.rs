//! MySQL EXPLAIN adapter
//!
//! Accepts EXPLAIN output from MySQL in two formats:
//! - JSON format (`EXPLAIN FORMAT=JSON`)
//! - Traditional tabular format (`EXPLAIN`), tab or pipe separated
//!
//! MySQL structures its plans differently from PostgreSQL:
//! - Uses "access_type" instead of "Node Type"
//! - Joins are a flat "nested_loop" list rather than a tree
//! - Costs are strings inside "cost_info"
//!
//! Both formats are rebuilt into the nested raw form. MySQL-native fields
//! such as `possible_keys`, `key` and `attached_condition` are kept under
//! their original names.
//!
//! # Examples
//!
//! ```
//! use sqltrace_analyzer::explain::mysql::parse_mysql_explain;
//!
//! let json_output = r#"{
//!   "query_block": {
//!     "select_id": 1,
//!     "cost_info": {
//!       "query_cost": "1.00"
//!     },
//!     "table": {
//!       "table_name": "users",
//!       "access_type": "ALL",
//!       "rows_examined_per_scan": 100
//!     }
//!   }
//! }"#;
//!
//! let raw = parse_mysql_explain(json_output).unwrap();
//! assert_eq!(raw.roots[0]["Node Type"], "Seq Scan");
//! ```

use crate::explain::normalize::RawPlan;
use serde_json::{Map, Number, Value};
use sqltrace_core::{Engine, ParseError, ParseErrorKind, PlanPath};

/// Parses MySQL EXPLAIN output (JSON or tabular format)
///
/// Automatically detects the format based on the input.
pub fn parse_mysql_explain(output: &str) -> Result<RawPlan, ParseError> {
    let trimmed = output.trim();

    if trimmed.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    if trimmed.starts_with('{') {
        parse_json_explain(trimmed)
    } else {
        parse_tabular_explain(output)
    }
}

/// Parses MySQL `EXPLAIN FORMAT=JSON` output
pub fn parse_json_explain(json: &str) -> Result<RawPlan, ParseError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ParseError::at_root(ParseErrorKind::InvalidJson(e.to_string())))?;

    let query_block = value
        .get("query_block")
        .ok_or_else(|| ParseError::at_root(ParseErrorKind::MissingSection("query_block".into())))?;

    let mut root = query_block_node(query_block, &PlanPath::root().key("query_block"))?;

    // The statement-level cost stands in for the root's cost when the root has none
    if let Some(query_cost) = query_block
        .pointer("/cost_info/query_cost")
        .and_then(cost_value)
        && let Some(fields) = root.as_object_mut()
        && !fields.contains_key("Total Cost")
    {
        fields.insert("Total Cost".into(), float_value(query_cost));
    }

    Ok(RawPlan::new(Engine::Mysql, vec![root]))
}

/// Parses a query_block; a block with nothing recognizable becomes a `Result` node
fn query_block_node(block: &Value, path: &PlanPath) -> Result<Value, ParseError> {
    if let Some(node) = block_content(block, path)? {
        return Ok(node);
    }

    let mut fields = node_fields("Result");
    if let Some(select_id) = block.get("select_id") {
        fields.insert("select_id".into(), select_id.clone());
    }
    if let Some(message) = block.get("message") {
        fields.insert("message".into(), message.clone());
    }
    Ok(Value::Object(fields))
}

/// Finds the operation a query_block (or an operation wrapper) contains
///
/// A block can contain:
/// - "ordering_operation" - ORDER BY
/// - "grouping_operation" - GROUP BY
/// - "duplicates_removal" - DISTINCT
/// - "nested_loop" - an array of joined tables
/// - "table" - a single table access
/// - "union_result" - UNION
fn block_content(block: &Value, path: &PlanPath) -> Result<Option<Value>, ParseError> {
    if let Some(ordering) = block.get("ordering_operation") {
        return operation_node("Sort", ordering, &path.key("ordering_operation")).map(Some);
    }

    if let Some(grouping) = block.get("grouping_operation") {
        return operation_node("Aggregate", grouping, &path.key("grouping_operation")).map(Some);
    }

    if let Some(distinct) = block.get("duplicates_removal") {
        return operation_node("Unique", distinct, &path.key("duplicates_removal")).map(Some);
    }

    if let Some(nested_loop) = block.get("nested_loop") {
        return nested_loop_node(nested_loop, &path.key("nested_loop")).map(Some);
    }

    if let Some(table) = block.get("table") {
        return table_node(table, &path.key("table")).map(Some);
    }

    if let Some(union_result) = block.get("union_result") {
        return union_node(union_result, &path.key("union_result")).map(Some);
    }

    Ok(None)
}

/// Sort, aggregate and distinct wrappers around the rest of the block
fn operation_node(node_type: &str, operation: &Value, path: &PlanPath) -> Result<Value, ParseError> {
    let mut fields = node_fields(node_type);

    if node_type == "Aggregate" {
        let hashed = flag(operation, "using_temporary_table");
        fields.insert(
            "Strategy".into(),
            if hashed { "Hashed" } else { "Sorted" }.into(),
        );
    }

    if let Some(cost) = operation
        .pointer("/cost_info/sort_cost")
        .and_then(cost_value)
    {
        fields.insert("Total Cost".into(), float_value(cost));
    }

    for key in [
        "using_filesort",
        "using_temporary_table",
        "group_by_columns",
        "cost_info",
    ] {
        if let Some(value) = operation.get(key) {
            fields.insert(key.into(), value.clone());
        }
    }

    let children = block_content(operation, path)?.into_iter().collect();
    Ok(with_children(fields, children))
}

/// Builds a left-deep nested loop chain from MySQL's flat join list
fn nested_loop_node(nested_loop: &Value, path: &PlanPath) -> Result<Value, ParseError> {
    let entries = nested_loop.as_array().ok_or_else(|| {
        ParseError::new(
            path.clone(),
            ParseErrorKind::ChildrenNotArray {
                field: "nested_loop".into(),
            },
        )
    })?;

    let mut tables = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let entry_path = path.index(i);
        if let Some(table) = entry.get("table") {
            tables.push(table_node(table, &entry_path.key("table"))?);
        } else if let Some(inner) = block_content(entry, &entry_path)? {
            tables.push(inner);
        }
    }

    let mut tables = tables.into_iter();
    let Some(mut current) = tables.next() else {
        return Err(ParseError::new(
            path.clone(),
            ParseErrorKind::MissingSection("table".into()),
        ));
    };

    for right in tables {
        let mut join = node_fields("Nested Loop");
        join.insert("Join Type".into(), "Inner".into());
        if let Some(prefix_cost) = right.pointer("/cost_info/prefix_cost").and_then(cost_value) {
            join.insert("Total Cost".into(), float_value(prefix_cost));
        }
        current = with_children(join, vec![current, right]);
    }

    Ok(current)
}

/// Fields that become structure rather than native properties
const TABLE_STRUCTURAL_KEYS: &[&str] = &["table_name", "subqueries", "materialized_from_subquery"];

/// Parses a single table access
fn table_node(table: &Value, path: &PlanPath) -> Result<Value, ParseError> {
    let object = table
        .as_object()
        .ok_or_else(|| ParseError::new(path.clone(), ParseErrorKind::NodeNotObject))?;

    let access_type = object
        .get("access_type")
        .and_then(Value::as_str)
        .unwrap_or("ALL");
    let using_index = flag(table, "using_index");

    let mut fields = node_fields(access_type_node(access_type, using_index));

    if let Some(name) = object.get("table_name").and_then(Value::as_str) {
        fields.insert("Relation Name".into(), name.into());
    }

    if let Some(cost_info) = object.get("cost_info")
        && let Some(read_cost) = cost_info.get("read_cost").and_then(cost_value)
    {
        let eval_cost = cost_info
            .get("eval_cost")
            .and_then(cost_value)
            .unwrap_or(0.0);
        fields.insert("Total Cost".into(), float_value(read_cost + eval_cost));
    }

    for (key, value) in object {
        if !TABLE_STRUCTURAL_KEYS.contains(&key.as_str()) {
            fields.insert(key.clone(), value.clone());
        }
    }

    let mut children = Vec::new();

    if let Some(materialized) = object.get("materialized_from_subquery") {
        let sub_path = path.key("materialized_from_subquery");
        if let Some(block) = materialized.get("query_block") {
            let inner = query_block_node(block, &sub_path.key("query_block"))?;
            children.push(with_children(node_fields("Subquery Scan"), vec![inner]));
        }
    }

    if let Some(subqueries) = object.get("subqueries") {
        let sub_path = path.key("subqueries");
        let entries = subqueries.as_array().ok_or_else(|| {
            ParseError::new(
                sub_path.clone(),
                ParseErrorKind::ChildrenNotArray {
                    field: "subqueries".into(),
                },
            )
        })?;
        for (i, subquery) in entries.iter().enumerate() {
            if let Some(block) = subquery.get("query_block") {
                let inner = query_block_node(block, &sub_path.index(i).key("query_block"))?;
                children.push(with_children(node_fields("Subquery Scan"), vec![inner]));
            }
        }
    }

    Ok(with_children(fields, children))
}

/// Parses union_result; each UNION member becomes a child
fn union_node(union: &Value, path: &PlanPath) -> Result<Value, ParseError> {
    let mut fields = node_fields("Append");

    for key in ["table_name", "access_type", "using_temporary_table"] {
        if let Some(value) = union.get(key) {
            fields.insert(key.into(), value.clone());
        }
    }

    let mut children = Vec::new();
    if let Some(specs) = union.get("query_specifications").and_then(Value::as_array) {
        let specs_path = path.key("query_specifications");
        for (i, spec) in specs.iter().enumerate() {
            if let Some(block) = spec.get("query_block") {
                children.push(query_block_node(block, &specs_path.index(i).key("query_block"))?);
            }
        }
    }

    Ok(with_children(fields, children))
}

/// Maps MySQL access_type to the common node type vocabulary
fn access_type_node(access_type: &str, using_index: bool) -> &'static str {
    match access_type.to_lowercase().as_str() {
        "all" => "Seq Scan",
        "index_merge" => "Bitmap Index Scan",
        "index" | "range" | "ref" | "eq_ref" | "const" | "system" | "ref_or_null"
        | "fulltext" | "unique_subquery" | "index_subquery" => {
            if using_index {
                "Index Only Scan"
            } else {
                "Index Scan"
            }
        }
        _ => "Unknown",
    }
}

/// Parses MySQL traditional tabular EXPLAIN output
///
/// The tabular format has these columns:
/// id | select_type | table | [partitions |] type | possible_keys | key | key_len | ref | rows | filtered | Extra
///
/// Rows are joined in order into a left-deep nested loop chain.
pub fn parse_tabular_explain(text: &str) -> Result<RawPlan, ParseError> {
    let mut nodes = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let content = line.trim();
        if content.is_empty()
            || content.starts_with('+')
            || content.contains(" in set")
            || is_header(content)
        {
            continue;
        }
        let row = parse_tabular_row(content).ok_or_else(|| {
            ParseError::at_line(line_no, ParseErrorKind::UnrecognizedLine(content.to_string()))
        })?;
        nodes.push(row.into_node());
    }

    let mut nodes = nodes.into_iter();
    let Some(mut current) = nodes.next() else {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    };

    for right in nodes {
        let mut join = node_fields("Nested Loop");
        join.insert("Join Type".into(), "Inner".into());
        current = with_children(join, vec![current, right]);
    }

    Ok(RawPlan::new(Engine::Mysql, vec![current]))
}

fn is_header(content: &str) -> bool {
    content.contains("select_type")
}

/// Represents a row from tabular EXPLAIN output
struct TabularRow {
    id: u64,
    select_type: String,
    table: Option<String>,
    partitions: Option<String>,
    access_type: String,
    possible_keys: Option<String>,
    key: Option<String>,
    key_len: Option<String>,
    ref_cols: Option<String>,
    rows: Option<u64>,
    filtered: Option<f64>,
    extra: Option<String>,
}

fn parse_tabular_row(line: &str) -> Option<TabularRow> {
    let parts: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        // Pipe-bordered client output: "| 1 | SIMPLE | users | ... |"
        line.trim_matches('|').split('|').map(str::trim).collect()
    };

    if parts.len() < 4 {
        return None;
    }

    let id = parts[0].parse().ok()?;

    // With partitions the access type moves from column 3 to column 4
    let has_partitions = parts.len() >= 12
        || (parts.len() >= 5 && !is_access_type(parts[3]) && is_access_type(parts[4]));
    let offset = usize::from(has_partitions);

    let column = |index: usize| -> Option<String> {
        parts
            .get(index)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("NULL"))
            .map(|s| s.to_string())
    };

    Some(TabularRow {
        id,
        select_type: parts[1].to_string(),
        table: column(2),
        partitions: if has_partitions { column(3) } else { None },
        access_type: column(3 + offset).unwrap_or_else(|| "ALL".to_string()),
        possible_keys: column(4 + offset),
        key: column(5 + offset),
        key_len: column(6 + offset),
        ref_cols: column(7 + offset),
        rows: column(8 + offset).and_then(|s| s.parse().ok()),
        filtered: column(9 + offset).and_then(|s| s.parse().ok()),
        extra: column(10 + offset),
    })
}

fn is_access_type(s: &str) -> bool {
    matches!(
        s.to_lowercase().as_str(),
        "all"
            | "index"
            | "range"
            | "ref"
            | "eq_ref"
            | "const"
            | "system"
            | "null"
            | "fulltext"
            | "ref_or_null"
            | "index_merge"
            | "unique_subquery"
            | "index_subquery"
    )
}

impl TabularRow {
    fn into_node(self) -> Value {
        let using_index = self.extra.as_deref().is_some_and(mentions_covering_index);

        let mut fields = node_fields(access_type_node(&self.access_type, using_index));
        if let Some(table) = self.table {
            fields.insert("Relation Name".into(), table.into());
        }

        fields.insert("select_id".into(), Value::from(self.id));
        fields.insert("select_type".into(), self.select_type.into());
        fields.insert("access_type".into(), self.access_type.into());
        if let Some(partitions) = self.partitions {
            fields.insert("partitions".into(), partitions.into());
        }
        if let Some(possible_keys) = self.possible_keys {
            let keys: Vec<Value> = possible_keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Value::from)
                .collect();
            fields.insert("possible_keys".into(), Value::Array(keys));
        }
        if let Some(key) = self.key {
            fields.insert("key".into(), key.into());
        }
        if let Some(key_len) = self.key_len {
            fields.insert("key_length".into(), key_len.into());
        }
        if let Some(ref_cols) = self.ref_cols {
            fields.insert("ref".into(), ref_cols.into());
        }
        if let Some(rows) = self.rows {
            fields.insert("rows_examined_per_scan".into(), Value::from(rows));
        }
        if let Some(filtered) = self.filtered {
            fields.insert("filtered".into(), float_value(filtered));
        }
        if let Some(extra) = self.extra {
            parse_extra_field(&extra, &mut fields);
            fields.insert("Extra".into(), extra.into());
        }

        Value::Object(fields)
    }
}

/// Parses the Extra column into boolean flags
fn parse_extra_field(extra: &str, fields: &mut Map<String, Value>) {
    let extra_lower = extra.to_lowercase();

    for (needle, key) in [
        ("using where", "using_where"),
        ("using filesort", "using_filesort"),
        ("using temporary", "using_temporary_table"),
        ("using join buffer", "using_join_buffer"),
        ("using index condition", "using_index_condition"),
        ("using mrr", "using_mrr"),
        ("using index for group-by", "using_index_for_group_by"),
        ("range checked for each record", "range_checked_for_each_record"),
    ] {
        if extra_lower.contains(needle) {
            fields.insert(key.into(), Value::Bool(true));
        }
    }

    if mentions_covering_index(extra) {
        fields.insert("using_index".into(), Value::Bool(true));
    }
}

fn mentions_covering_index(extra: &str) -> bool {
    let lower = extra.to_lowercase();
    lower.contains("using index") && !lower.contains("using index condition")
}

fn node_fields(node_type: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("Node Type".into(), node_type.into());
    fields
}

fn with_children(mut fields: Map<String, Value>, children: Vec<Value>) -> Value {
    if !children.is_empty() {
        fields.insert("Plans".into(), Value::Array(children));
    }
    Value::Object(fields)
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// MySQL reports costs as strings ("12.50"); numbers are accepted too
fn cost_value(value: &Value) -> Option<f64> {
    let cost = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    };
    cost.filter(|v| v.is_finite() && *v >= 0.0)
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
