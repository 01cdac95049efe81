//! SQLite EXPLAIN QUERY PLAN adapter
//!
//! SQLite's EXPLAIN QUERY PLAN outputs a tree-like structure showing how
//! tables are accessed and joined. The format is:
//!
//! ```text
//! QUERY PLAN
//! |--SCAN users
//! |--SEARCH orders USING INDEX idx_user_id (user_id=?)
//! `--USE TEMP B-TREE FOR ORDER BY
//! ```
//!
//! Querying `EXPLAIN QUERY PLAN` directly yields `id|parent|notused|detail`
//! rows instead; older versions yield `selectid|order|from|detail`. All three
//! are accepted, as is a bare list of detail lines.
//!
//! SQLite reports neither costs nor row counts, so nodes carry only a type,
//! the table and index involved, and the original `detail` text.
//!
//! # Examples
//!
//! ```
//! use sqltrace_analyzer::explain::sqlite::parse_sqlite_explain;
//!
//! let output = r#"QUERY PLAN
//! |--SCAN users
//! `--SEARCH orders USING INDEX idx_user_id (user_id=?)"#;
//!
//! let raw = parse_sqlite_explain(output).unwrap();
//! assert_eq!(raw.roots.len(), 2);
//! assert_eq!(raw.roots[0]["Node Type"], "Seq Scan");
//! ```

use crate::explain::normalize::RawPlan;
use serde_json::{Map, Value};
use sqltrace_core::{Engine, ParseError, ParseErrorKind};
use std::collections::HashMap;

/// Parses SQLite EXPLAIN QUERY PLAN output
///
/// Supports:
/// - Tree format (sqlite3 shell): indented with `|--` and `` `-- `` prefixes
/// - Row format: `id|parent|notused|detail`
/// - Legacy row format: `selectid|order|from|detail`
/// - One detail per line
pub fn parse_sqlite_explain(output: &str) -> Result<RawPlan, ParseError> {
    let trimmed = output.trim();

    if trimmed.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    if trimmed.starts_with("QUERY PLAN") || trimmed.contains("|--") || trimmed.contains("`--") {
        parse_tree_format(output)
    } else if let Some(rows) = parse_rows(trimmed) {
        Ok(build_from_rows(rows))
    } else {
        parse_simple_format(trimmed)
    }
}

/// Parses the tree format output from EXPLAIN QUERY PLAN
///
/// Example:
/// ```text
/// QUERY PLAN
/// |--SCAN users
/// |--SEARCH orders USING INDEX idx_user_id (user_id=?)
/// |  `--CORRELATED SCALAR SUBQUERY 2
/// |     `--SEARCH items USING COVERING INDEX idx_items_order (order_id=?)
/// `--USE TEMP B-TREE FOR ORDER BY
/// ```
///
/// Each top-level entry becomes its own root.
pub fn parse_tree_format(output: &str) -> Result<RawPlan, ParseError> {
    let mut roots: Vec<Value> = Vec::new();
    let mut stack: Vec<(usize, Map<String, Value>, Vec<Value>)> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with("QUERY PLAN") {
            continue;
        }

        let (indent, detail) = split_tree_prefix(line);
        let fields = describe_detail(detail);

        while stack.last().is_some_and(|(level, _, _)| *level >= indent) {
            close_top(&mut stack, &mut roots);
        }
        stack.push((indent, fields, Vec::new()));
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }

    if roots.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    Ok(RawPlan::new(Engine::Sqlite, roots))
}

fn close_top(stack: &mut Vec<(usize, Map<String, Value>, Vec<Value>)>, roots: &mut Vec<Value>) {
    let Some((_, fields, children)) = stack.pop() else {
        return;
    };
    let value = with_children(fields, children);
    match stack.last_mut() {
        Some((_, _, siblings)) => siblings.push(value),
        None => roots.push(value),
    }
}

/// Splits a tree line into its nesting width and detail text
fn split_tree_prefix(line: &str) -> (usize, &str) {
    let prefix_len = line
        .find(|c: char| !matches!(c, ' ' | '|' | '`' | '-'))
        .unwrap_or(line.len());
    (prefix_len, line[prefix_len..].trim())
}

/// A row of the four-column formats
struct PlanRow {
    first: u64,
    second: u64,
    third: u64,
    detail: String,
}

/// Splits every line into four `|` separated columns; `None` if any line does not fit
fn parse_rows(output: &str) -> Option<Vec<PlanRow>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.splitn(4, '|');
            let first = parts.next()?.trim().parse().ok()?;
            let second = parts.next()?.trim().parse().ok()?;
            let third = parts.next()?.trim().parse().ok()?;
            let detail = parts.next()?.trim().to_string();
            Some(PlanRow {
                first,
                second,
                third,
                detail,
            })
        })
        .collect()
}

/// Builds roots from rows, choosing between the id/parent and legacy layouts
///
/// Rows are read as `id|parent|notused|detail` when ids are distinct and each
/// parent is 0 or an id seen on an earlier row; otherwise as
/// `selectid|order|from|detail`, with one root per row.
fn build_from_rows(rows: Vec<PlanRow>) -> RawPlan {
    let mut seen: HashMap<u64, usize> = HashMap::new();
    let mut linked = true;
    for (position, row) in rows.iter().enumerate() {
        if seen.contains_key(&row.first) || (row.second != 0 && !seen.contains_key(&row.second)) {
            linked = false;
            break;
        }
        seen.insert(row.first, position);
    }

    if !linked {
        let roots = rows
            .into_iter()
            .map(|row| {
                let mut fields = describe_detail(&row.detail);
                fields.insert("selectid".into(), Value::from(row.first));
                fields.insert("order".into(), Value::from(row.second));
                fields.insert("from".into(), Value::from(row.third));
                Value::Object(fields)
            })
            .collect();
        return RawPlan::new(Engine::Sqlite, roots);
    }

    // Parents always precede their children, so folding from the end
    // finishes every child before its parent is built.
    let mut pending: Vec<(u64, Map<String, Value>, Vec<Value>)> = rows
        .iter()
        .map(|row| (row.second, describe_detail(&row.detail), Vec::new()))
        .collect();
    let mut roots = Vec::new();

    while let Some((parent, fields, mut children)) = pending.pop() {
        children.reverse();
        let value = with_children(fields, children);
        match seen.get(&parent) {
            Some(&position) if parent != 0 && position < pending.len() => {
                pending[position].2.push(value);
            }
            _ => roots.push(value),
        }
    }
    roots.reverse();

    RawPlan::new(Engine::Sqlite, roots)
}

/// Parses one detail per line; each line is its own root
fn parse_simple_format(output: &str) -> Result<RawPlan, ParseError> {
    let roots: Vec<Value> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Value::Object(describe_detail(line)))
        .collect();

    if roots.is_empty() {
        return Err(ParseError::at_root(ParseErrorKind::EmptyOutput));
    }

    Ok(RawPlan::new(Engine::Sqlite, roots))
}

/// Maps a detail string to node fields
fn describe_detail(detail: &str) -> Map<String, Value> {
    let detail = detail.trim();
    // ASCII-only so byte offsets stay valid in `detail`
    let upper = detail.to_ascii_uppercase();
    let mut fields = Map::new();

    let node_type = if upper.starts_with("SCAN") {
        describe_scan(detail, &upper, &mut fields)
    } else if upper.starts_with("SEARCH") {
        describe_search(detail, &upper, &mut fields)
    } else if upper.starts_with("USE TEMP B-TREE") || upper.starts_with("USING TEMP B-TREE") {
        fields.insert("using_temp_btree".into(), Value::Bool(true));
        if upper.contains("DISTINCT") {
            "Unique"
        } else if upper.contains("GROUP BY") {
            fields.insert("Strategy".into(), "Sorted".into());
            "Aggregate"
        } else {
            "Sort"
        }
    } else if upper.starts_with("COMPOUND") {
        "SetOp"
    } else if upper.starts_with("UNION ALL") {
        "Append"
    } else if upper.starts_with("UNION")
        || upper.starts_with("INTERSECT")
        || upper.starts_with("EXCEPT")
    {
        "SetOp"
    } else if upper.starts_with("CO-ROUTINE") {
        if let Some(name) = detail.split_whitespace().nth(1) {
            fields.insert("CTE Name".into(), name.into());
        }
        "CTE Scan"
    } else if upper.starts_with("MATERIALIZE") {
        if let Some(name) = detail.split_whitespace().nth(1) {
            fields.insert("Subplan Name".into(), name.into());
        }
        "Materialize"
    } else if upper.starts_with("CORRELATED")
        || upper.starts_with("SCALAR SUBQUERY")
        || upper.starts_with("LIST SUBQUERY")
    {
        if upper.starts_with("CORRELATED") {
            fields.insert("correlated".into(), Value::Bool(true));
        }
        "SubPlan"
    } else if upper.starts_with("MERGE") {
        "Merge Append"
    } else if upper.starts_with("LEFT-MOST SUBQUERY") {
        "Subquery Scan"
    } else if upper.starts_with("LEFT") || upper.starts_with("RIGHT") {
        let join_type = if upper.starts_with("LEFT") { "Left" } else { "Right" };
        fields.insert("Join Type".into(), join_type.into());
        "Nested Loop"
    } else if upper.starts_with("BLOOM FILTER") {
        "Bloom Filter"
    } else if upper.starts_with("EXECUTE") {
        "Result"
    } else if upper.contains("AUTOMATIC COVERING INDEX") || upper.contains("AUTO-INDEX") {
        fields.insert("Index Name".into(), "AUTO-INDEX".into());
        fields.insert("auto_index".into(), Value::Bool(true));
        "Index Only Scan"
    } else {
        "Unknown"
    };

    let mut node = Map::new();
    node.insert("Node Type".into(), node_type.into());
    node.extend(fields);
    node.insert("detail".into(), detail.into());
    node
}

/// SCAN users / SCAN users USING COVERING INDEX idx_all / SCAN CONSTANT ROW
fn describe_scan(detail: &str, upper: &str, fields: &mut Map<String, Value>) -> &'static str {
    if upper.contains("CONSTANT ROW") {
        return "Result";
    }

    insert_table(detail, fields);

    if upper.contains("USING COVERING INDEX") {
        insert_index_name(detail, "USING COVERING INDEX", fields);
        "Index Only Scan"
    } else if upper.contains("USING INDEX") {
        insert_index_name(detail, "USING INDEX", fields);
        "Index Scan"
    } else if upper.contains("SUBQUERY") {
        "Subquery Scan"
    } else {
        "Seq Scan"
    }
}

/// SEARCH users USING INDEX idx_email (email=?)
/// SEARCH items USING INTEGER PRIMARY KEY (rowid=?)
fn describe_search(detail: &str, upper: &str, fields: &mut Map<String, Value>) -> &'static str {
    insert_table(detail, fields);
    if let Some(cond) = extract_index_condition(detail) {
        fields.insert("Index Cond".into(), cond.into());
    }

    if upper.contains("AUTOMATIC COVERING INDEX") || upper.contains("AUTO-INDEX") {
        fields.insert("Index Name".into(), "AUTO-INDEX".into());
        fields.insert("auto_index".into(), Value::Bool(true));
        "Index Only Scan"
    } else if upper.contains("USING COVERING INDEX") {
        insert_index_name(detail, "USING COVERING INDEX", fields);
        "Index Only Scan"
    } else if upper.contains("USING INDEX") {
        insert_index_name(detail, "USING INDEX", fields);
        "Index Scan"
    } else {
        if upper.contains("INTEGER PRIMARY KEY") || upper.contains("ROWID") {
            fields.insert("Index Name".into(), "PRIMARY KEY".into());
        }
        "Index Scan"
    }
}

/// Reads `OP [TABLE] name [AS alias]`
fn insert_table(detail: &str, fields: &mut Map<String, Value>) {
    let mut words = detail.split_whitespace().skip(1).peekable();
    if words.peek().is_some_and(|w| w.eq_ignore_ascii_case("TABLE")) {
        words.next();
    }
    let Some(table) = words.next() else {
        return;
    };
    if table.eq_ignore_ascii_case("SUBQUERY") || table.eq_ignore_ascii_case("CONSTANT") {
        return;
    }
    fields.insert("Relation Name".into(), table.into());

    if words.next().is_some_and(|w| w.eq_ignore_ascii_case("AS"))
        && let Some(alias) = words.next()
    {
        fields.insert("Alias".into(), alias.into());
    }
}

/// Reads the index name following `keyword`, matched ASCII case-insensitively
fn insert_index_name(detail: &str, keyword: &str, fields: &mut Map<String, Value>) {
    let Some(found) = detail.to_ascii_uppercase().find(keyword) else {
        return;
    };
    let remaining = detail[found + keyword.len()..].trim();
    if let Some(name) = remaining
        .split_whitespace()
        .next()
        .and_then(|word| word.split('(').next())
        .filter(|name| !name.is_empty())
    {
        fields.insert("Index Name".into(), name.into());
    }
}

/// Extracts index condition from parentheses
fn extract_index_condition(detail: &str) -> Option<&str> {
    let start = detail.find('(')?;
    let end = detail.rfind(')')?;
    (start < end).then(|| &detail[start + 1..end])
}

fn with_children(mut fields: Map<String, Value>, children: Vec<Value>) -> Value {
    if !children.is_empty() {
        fields.insert("Plans".into(), Value::Array(children));
    }
    Value::Object(fields)
}
