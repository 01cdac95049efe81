//! PostgreSQL EXPLAIN adapter
//!
//! Accepts EXPLAIN output from PostgreSQL in two formats:
//! - JSON format (`EXPLAIN (FORMAT JSON)`), already in the nested raw form
//! - Text format (default `EXPLAIN`), rebuilt into the same shape from its indentation
//!
//! # Examples
//!
//! ```
//! use sqltrace_analyzer::explain::postgres::parse_postgres_explain;
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Startup Cost": 0.0,
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100
//!     },
//!     "Planning Time": 0.05
//!   }
//! ]"#;
//!
//! let raw = parse_postgres_explain(json_output).unwrap();
//! assert_eq!(raw.roots.len(), 1);
//! assert_eq!(raw.planning_time_ms, Some(0.05));
//! ```

use crate::explain::normalize::RawPlan;
use serde_json::{Map, Number, Value};
use sqltrace_core::{Engine, ParseError, ParseErrorKind, PlanPath};

/// Parses PostgreSQL EXPLAIN output (JSON or text format)
///
/// Automatically detects the format based on the input.
pub fn parse_postgres_explain(output: &str) -> Result<RawPlan, ParseError> {
    let trimmed = output.trim();

    if trimmed.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        parse_json_explain(trimmed)
    } else {
        parse_text_explain(output)
    }
}

/// Parses `EXPLAIN (FORMAT JSON)` output.
///
/// Accepts the usual array of `{"Plan": ...}` statements, a single such
/// object, or a bare plan node. Each statement contributes one root.
pub fn parse_json_explain(json: &str) -> Result<RawPlan, ParseError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ParseError::at_root(ParseErrorKind::InvalidJson(e.to_string())))?;

    let statements: Vec<(PlanPath, &Value)> = match &value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (PlanPath::root().index(i), item))
            .collect(),
        other => vec![(PlanPath::root(), other)],
    };

    if statements.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    let mut roots = Vec::with_capacity(statements.len());
    let mut planning_time_ms: Option<f64> = None;
    let mut execution_time_ms: Option<f64> = None;

    for (path, statement) in statements {
        let object = statement
            .as_object()
            .ok_or_else(|| ParseError::new(path.clone(), ParseErrorKind::NodeNotObject))?;

        if let Some(plan) = object.get("Plan") {
            roots.push(plan.clone());
            if let Some(ms) = object.get("Planning Time").and_then(Value::as_f64) {
                *planning_time_ms.get_or_insert(0.0) += ms;
            }
            if let Some(ms) = object.get("Execution Time").and_then(Value::as_f64) {
                *execution_time_ms.get_or_insert(0.0) += ms;
            }
        } else if object.contains_key("Node Type") {
            roots.push(statement.clone());
        } else {
            return Err(ParseError::new(
                path,
                ParseErrorKind::MissingSection("Plan".into()),
            ));
        }
    }

    Ok(RawPlan {
        engine: Engine::Postgres,
        roots,
        planning_time_ms,
        execution_time_ms,
    })
}

/// Parses PostgreSQL text-format EXPLAIN output.
///
/// Node lines are the first line and every line starting with `->`; their
/// indentation decides nesting. Other lines are properties of the node above
/// them (`Filter: ...`, `Sort Method: ...`). psql decorations such as the
/// `QUERY PLAN` header and `(5 rows)` footer are skipped.
pub fn parse_text_explain(text: &str) -> Result<RawPlan, ParseError> {
    let mut builder = TextTreeBuilder::default();
    let mut planning_time_ms = None;
    let mut execution_time_ms = None;
    let mut in_trailer = false;

    for line in text.lines() {
        let content = line.trim();
        if is_decoration(content) {
            continue;
        }

        let lower = content.to_ascii_lowercase();
        if lower.starts_with("planning time:") {
            planning_time_ms = extract_time_ms(content);
            in_trailer = true;
            continue;
        }
        if lower.starts_with("execution time:") {
            execution_time_ms = extract_time_ms(content);
            in_trailer = true;
            continue;
        }
        if count_indent(line) == 0 && matches!(content, "Planning:" | "JIT:") {
            in_trailer = true;
            continue;
        }
        if in_trailer {
            continue;
        }

        let indent = count_indent(line);
        if let Some(node_text) = content.strip_prefix("->") {
            builder.open(indent, parse_node_line(node_text.trim()));
        } else if builder.starts_new_root(indent) {
            builder.open(indent, parse_node_line(content));
        } else if let Some((label, relationship)) = subplan_label(content) {
            builder.pending_subplan = Some((label.to_string(), relationship));
        } else {
            builder.add_property(content);
        }
    }

    let roots = builder.finish();
    if roots.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    Ok(RawPlan {
        engine: Engine::Postgres,
        roots,
        planning_time_ms,
        execution_time_ms,
    })
}

/// Assembles nested node objects from indented text lines
#[derive(Default)]
struct TextTreeBuilder {
    stack: Vec<OpenNode>,
    roots: Vec<Value>,
    /// "SubPlan 1" style label waiting for the node it introduces
    pending_subplan: Option<(String, &'static str)>,
}

struct OpenNode {
    indent: usize,
    fields: Map<String, Value>,
    children: Vec<Value>,
}

impl TextTreeBuilder {
    fn starts_new_root(&self, indent: usize) -> bool {
        self.stack.first().is_none_or(|root| indent <= root.indent)
    }

    fn open(&mut self, indent: usize, mut fields: Map<String, Value>) {
        while self.stack.last().is_some_and(|node| node.indent >= indent) {
            self.close_top();
        }
        if let Some((label, relationship)) = self.pending_subplan.take() {
            fields.insert("Parent Relationship".into(), relationship.into());
            fields.insert("Subplan Name".into(), label.into());
        }
        self.stack.push(OpenNode {
            indent,
            fields,
            children: Vec::new(),
        });
    }

    fn add_property(&mut self, content: &str) {
        if let Some(node) = self.stack.last_mut() {
            parse_property_line(content, &mut node.fields);
        }
    }

    fn close_top(&mut self) {
        let Some(node) = self.stack.pop() else {
            return;
        };
        let mut fields = node.fields;
        if !node.children.is_empty() {
            fields.insert("Plans".into(), Value::Array(node.children));
        }
        let value = Value::Object(fields);
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(value),
            None => self.roots.push(value),
        }
    }

    fn finish(mut self) -> Vec<Value> {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.roots
    }
}

fn is_decoration(content: &str) -> bool {
    content.is_empty()
        || content == "QUERY PLAN"
        || content.chars().all(|c| c == '-' || c == '+')
        || (content.starts_with('(') && (content.ends_with(" rows)") || content.ends_with(" row)")))
}

fn subplan_label(content: &str) -> Option<(&str, &'static str)> {
    if content.starts_with("SubPlan") {
        Some((content, "SubPlan"))
    } else if content.starts_with("InitPlan") {
        Some((content, "InitPlan"))
    } else if content.starts_with("CTE ") && !content.contains(':') {
        Some((content, "InitPlan"))
    } else {
        None
    }
}

/// Parses a node line such as
/// `Index Scan using users_pkey on users u  (cost=0.29..8.30 rows=1 width=40)`
fn parse_node_line(content: &str) -> Map<String, Value> {
    let (label, estimates) = split_estimates(content);
    let mut fields = Map::new();
    describe_operation(label.trim(), &mut fields);
    if let Some(estimates) = estimates {
        parse_estimates(estimates, &mut fields);
    }
    fields
}

fn split_estimates(content: &str) -> (&str, Option<&str>) {
    ["(cost=", "(actual ", "(never executed)"]
        .iter()
        .filter_map(|marker| content.find(marker))
        .min()
        .map(|idx| (&content[..idx], Some(&content[idx..])))
        .unwrap_or((content, None))
}

/// Node types as they appear in text output; longer names first where one
/// name is a prefix of another
const TEXT_NODE_TYPES: &[&str] = &[
    "Index Only Scan",
    "Index Scan",
    "Bitmap Index Scan",
    "Bitmap Heap Scan",
    "Seq Scan",
    "Sample Scan",
    "Tid Range Scan",
    "Tid Scan",
    "Subquery Scan",
    "Function Scan",
    "Table Function Scan",
    "Values Scan",
    "CTE Scan",
    "Named Tuplestore Scan",
    "WorkTable Scan",
    "Foreign Scan",
    "Custom Scan",
    "Incremental Sort",
    "Sort",
    "GroupAggregate",
    "HashAggregate",
    "MixedAggregate",
    "Aggregate",
    "WindowAgg",
    "Limit",
    "Merge Append",
    "Append",
    "Recursive Union",
    "Materialize",
    "Memoize",
    "Hash",
    "Unique",
    "Group",
    "BitmapAnd",
    "BitmapOr",
    "Result",
    "ProjectSet",
    "LockRows",
    "Gather Merge",
    "Gather",
    "HashSetOp",
    "SetOp",
    "Insert",
    "Update",
    "Delete",
    "Merge",
];

const JOIN_TYPE_WORDS: &[&str] = &["Left", "Right", "Full", "Semi", "Anti"];

fn describe_operation(label: &str, fields: &mut Map<String, Value>) {
    let mut label = label;
    if let Some(rest) = label.strip_prefix("Parallel ") {
        fields.insert("Parallel Aware".into(), Value::Bool(true));
        label = rest;
    }

    if let Some((node_type, join_type, rest)) = split_join(label) {
        fields.insert("Node Type".into(), node_type.into());
        fields.insert("Join Type".into(), join_type.into());
        describe_target(node_type, &rest, fields);
        return;
    }

    let matched = TEXT_NODE_TYPES.iter().find(|name| {
        label == **name
            || label
                .strip_prefix(**name)
                .is_some_and(|rest| rest.starts_with(' '))
    });

    let (node_type, rest) = match matched {
        Some(name) => (*name, label[name.len()..].trim()),
        None => {
            // Unknown operation: keep the words before any target clause as its name
            let end = [" on ", " using "]
                .iter()
                .filter_map(|m| label.find(m))
                .min()
                .unwrap_or(label.len());
            (&label[..end], label[end..].trim())
        }
    };

    match node_type {
        "HashAggregate" => set_strategy(fields, "Aggregate", "Hashed"),
        "GroupAggregate" => set_strategy(fields, "Aggregate", "Sorted"),
        "MixedAggregate" => set_strategy(fields, "Aggregate", "Mixed"),
        "Aggregate" => set_strategy(fields, "Aggregate", "Plain"),
        "HashSetOp" => set_strategy(fields, "SetOp", "Hashed"),
        "Insert" | "Update" | "Delete" | "Merge" => {
            fields.insert("Node Type".into(), "ModifyTable".into());
            fields.insert("Operation".into(), node_type.into());
        }
        other => {
            fields.insert("Node Type".into(), other.into());
        }
    }

    let target_type = fields
        .get("Node Type")
        .and_then(Value::as_str)
        .unwrap_or(node_type)
        .to_string();
    describe_target(&target_type, rest, fields);
}

fn set_strategy(fields: &mut Map<String, Value>, node_type: &str, strategy: &str) {
    fields.insert("Node Type".into(), node_type.into());
    fields.insert("Strategy".into(), strategy.into());
}

/// Splits `Hash Left Join`, `Nested Loop Anti Join` and friends into node type and join type
fn split_join(label: &str) -> Option<(&'static str, String, String)> {
    for (prefix, node_type) in [
        ("Nested Loop", "Nested Loop"),
        ("Hash", "Hash Join"),
        ("Merge", "Merge Join"),
    ] {
        let Some(rest) = label.strip_prefix(prefix) else {
            continue;
        };
        if !rest.is_empty() && !rest.starts_with(' ') {
            continue;
        }
        let words: Vec<&str> = rest.split_whitespace().collect();
        match words.iter().position(|w| *w == "Join") {
            Some(pos) if words[..pos].iter().all(|w| JOIN_TYPE_WORDS.contains(w)) => {
                let join_type = if pos == 0 {
                    "Inner".to_string()
                } else {
                    words[..pos].join(" ")
                };
                return Some((node_type, join_type, words[pos + 1..].join(" ")));
            }
            _ if node_type == "Nested Loop" => {
                return Some((node_type, "Inner".to_string(), words.join(" ")));
            }
            _ => {}
        }
    }
    None
}

/// Reads `[Backward] [using index] [on relation [alias]]`
fn describe_target(node_type: &str, rest: &str, fields: &mut Map<String, Value>) {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "Backward" => {
                fields.insert("Scan Direction".into(), "Backward".into());
            }
            "using" if i + 1 < tokens.len() => {
                fields.insert("Index Name".into(), tokens[i + 1].into());
                i += 1;
            }
            "on" if i + 1 < tokens.len() => {
                let target = tokens[i + 1];
                let alias = tokens.get(i + 2).copied();
                insert_target(node_type, target, alias, fields);
                break;
            }
            _ => {}
        }
        i += 1;
    }
}

fn insert_target(node_type: &str, target: &str, alias: Option<&str>, fields: &mut Map<String, Value>) {
    let key = match node_type {
        "Bitmap Index Scan" => "Index Name",
        "CTE Scan" => "CTE Name",
        "Function Scan" => "Function Name",
        "Subquery Scan" => "Alias",
        _ => "Relation Name",
    };

    if key == "Relation Name" {
        let relation = match target.split_once('.') {
            Some((schema, relation)) => {
                fields.insert("Schema".into(), schema.into());
                relation
            }
            None => target,
        };
        fields.insert("Relation Name".into(), relation.into());
        fields.insert("Alias".into(), alias.unwrap_or(relation).into());
    } else {
        fields.insert(key.into(), target.into());
        if key != "Alias" && key != "Index Name" {
            fields.insert("Alias".into(), alias.unwrap_or(target).into());
        }
    }
}

/// Parses `(cost=a..b rows=n width=w) (actual time=a..b rows=n loops=l)`
fn parse_estimates(section: &str, fields: &mut Map<String, Value>) {
    for group in section.split('(').skip(1) {
        let group = group.split(')').next().unwrap_or_default().trim();

        if group == "never executed" {
            fields.insert("Actual Loops".into(), Value::from(0u64));
        } else if let Some(rest) = group.strip_prefix("cost=") {
            let mut parts = rest.split_whitespace();
            if let Some((startup, total)) = parts.next().and_then(parse_range) {
                fields.insert("Startup Cost".into(), float_value(startup));
                fields.insert("Total Cost".into(), float_value(total));
            }
            for part in parts {
                match part.split_once('=') {
                    Some(("rows", v)) => insert_count(fields, "Plan Rows", v),
                    Some(("width", v)) => insert_count(fields, "Plan Width", v),
                    _ => {}
                }
            }
        } else if let Some(rest) = group.strip_prefix("actual") {
            for part in rest.split_whitespace() {
                match part.split_once('=') {
                    Some(("time", v)) => {
                        if let Some((startup, total)) = parse_range(v) {
                            fields.insert("Actual Startup Time".into(), float_value(startup));
                            fields.insert("Actual Total Time".into(), float_value(total));
                        }
                    }
                    Some(("rows", v)) => insert_count(fields, "Actual Rows", v),
                    Some(("loops", v)) => insert_count(fields, "Actual Loops", v),
                    _ => {}
                }
            }
        }
    }
}

/// Parses a property line such as `Filter: (amount > 100)`
fn parse_property_line(content: &str, fields: &mut Map<String, Value>) {
    let Some((key, value)) = content.split_once(": ") else {
        return;
    };
    let value = value.trim();

    match key {
        "Sort Method" => {
            // "external merge  Disk: 1024kB"
            let mut segments = value.split("  ").map(str::trim).filter(|s| !s.is_empty());
            if let Some(method) = segments.next() {
                fields.insert("Sort Method".into(), method.into());
            }
            for segment in segments {
                if let Some((space_type, used)) = segment.split_once(": ") {
                    fields.insert("Sort Space Type".into(), space_type.into());
                    insert_count(fields, "Sort Space Used", used.trim_end_matches("kB"));
                }
            }
        }
        "Buckets" => {
            // "1024  Batches: 1  Memory Usage: 9kB"
            let mut segments = value.split("  ").map(str::trim).filter(|s| !s.is_empty());
            if let Some(buckets) = segments.next() {
                insert_count(fields, "Hash Buckets", buckets);
            }
            for segment in segments {
                match segment.split_once(": ") {
                    Some(("Batches", v)) => insert_count(fields, "Hash Batches", v),
                    Some(("Memory Usage", v)) => {
                        insert_count(fields, "Peak Memory Usage", v.trim_end_matches("kB"))
                    }
                    _ => {}
                }
            }
        }
        _ => {
            fields.insert(key.to_string(), text_value(value));
        }
    }
}

fn text_value(value: &str) -> Value {
    if let Ok(n) = value.parse::<u64>() {
        Value::from(n)
    } else {
        Value::String(value.to_string())
    }
}

fn insert_count(fields: &mut Map<String, Value>, key: &str, raw: &str) {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        fields.insert(key.into(), Value::from(n));
    } else if let Ok(v) = raw.parse::<f64>() {
        fields.insert(key.into(), float_value(v));
    }
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn parse_range(s: &str) -> Option<(f64, f64)> {
    let (start, end) = s.split_once("..")?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Helper to count leading spaces (indentation)
fn count_indent(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Helper to extract time in ms from a line like "Planning Time: 0.123 ms"
fn extract_time_ms(line: &str) -> Option<f64> {
    let (_, value) = line.split_once(':')?;
    value.trim().trim_end_matches("ms").trim().parse().ok()
}

#[cfg(test)]
mod tests;
