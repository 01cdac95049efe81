//! Tests for the PostgreSQL EXPLAIN adapter

use super::*;
use crate::explain::normalize::normalize;
use serde_json::json;

mod json_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_seq_scan() {
        let json = r#"[
            {
                "Plan": {
                    "Node Type": "Seq Scan",
                    "Relation Name": "users",
                    "Alias": "users",
                    "Startup Cost": 0.00,
                    "Total Cost": 35.50,
                    "Plan Rows": 2550,
                    "Plan Width": 36
                },
                "Planning Time": 0.05
            }
        ]"#;

        let raw = parse_postgres_explain(json).unwrap();
        assert_eq!(raw.engine, Engine::Postgres);
        assert_eq!(raw.roots.len(), 1);
        assert_eq!(raw.planning_time_ms, Some(0.05));
        assert_eq!(raw.execution_time_ms, None);
        assert_eq!(raw.roots[0]["Relation Name"], json!("users"));
    }

    #[test]
    fn test_parse_analyze_with_execution_time() {
        let json = r#"[{
            "Plan": {
                "Node Type": "Hash Join",
                "Join Type": "Inner",
                "Total Cost": 250.0,
                "Actual Total Time": 4.2,
                "Actual Rows": 120,
                "Plans": [
                    {"Node Type": "Seq Scan", "Relation Name": "orders", "Actual Rows": 1000},
                    {"Node Type": "Hash", "Plans": [
                        {"Node Type": "Seq Scan", "Relation Name": "users", "Actual Rows": 50}
                    ]}
                ]
            },
            "Planning Time": 0.2,
            "Execution Time": 4.5
        }]"#;

        let raw = parse_postgres_explain(json).unwrap();
        assert_eq!(raw.execution_time_ms, Some(4.5));

        let tree = normalize(&raw.roots).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.node(3).unwrap().relation_name.as_deref(), Some("users"));
        assert_eq!(
            tree.node(0).unwrap().extra.get("Join Type"),
            Some(&json!("Inner"))
        );
    }

    #[test]
    fn test_multiple_statements_become_separate_roots() {
        let json = r#"[
            {"Plan": {"Node Type": "Result"}, "Planning Time": 0.1},
            {"Plan": {"Node Type": "Seq Scan", "Relation Name": "t"}, "Planning Time": 0.2}
        ]"#;
        let raw = parse_postgres_explain(json).unwrap();
        assert_eq!(raw.roots.len(), 2);
        let planning = raw.planning_time_ms.unwrap();
        assert!((planning - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_bare_plan_object_accepted() {
        let raw = parse_postgres_explain(r#"{"Plan": {"Node Type": "Result"}}"#).unwrap();
        assert_eq!(raw.roots, vec![json!({"Node Type": "Result"})]);

        let raw = parse_postgres_explain(r#"{"Node Type": "Result"}"#).unwrap();
        assert_eq!(raw.roots.len(), 1);
    }

    #[test]
    fn test_missing_plan_section() {
        let err = parse_postgres_explain(r#"[{"Planning Time": 0.1}]"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSection("Plan".into()));
        assert_eq!(err.path.to_string(), "/0");
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_postgres_explain("[{\"Plan\": ").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidJson(_)));
        assert!(err.path.is_root());
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(
            parse_postgres_explain("   ").unwrap_err().kind,
            ParseErrorKind::EmptyOutput
        );
        assert_eq!(
            parse_postgres_explain("[]").unwrap_err().kind,
            ParseErrorKind::EmptyOutput
        );
    }
}

mod text_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HASH_JOIN_TEXT: &str = "\
Hash Join  (cost=1.09..2.19 rows=5 width=68) (actual time=0.050..0.060 rows=5 loops=1)
  Hash Cond: (o.user_id = u.id)
  ->  Seq Scan on orders o  (cost=0.00..1.05 rows=5 width=36) (actual time=0.010..0.012 rows=5 loops=1)
        Filter: (amount > 100)
        Rows Removed by Filter: 3
  ->  Hash  (cost=1.04..1.04 rows=4 width=36) (actual time=0.020..0.021 rows=4 loops=1)
        Buckets: 1024  Batches: 1  Memory Usage: 9kB
        ->  Seq Scan on public.users u  (cost=0.00..1.04 rows=4 width=36) (actual time=0.005..0.007 rows=4 loops=1)
Planning Time: 0.150 ms
Execution Time: 0.100 ms";

    #[test]
    fn test_text_nesting_follows_indentation() {
        let raw = parse_postgres_explain(HASH_JOIN_TEXT).unwrap();
        assert_eq!(raw.roots.len(), 1);
        assert_eq!(raw.planning_time_ms, Some(0.150));
        assert_eq!(raw.execution_time_ms, Some(0.100));

        let tree = normalize(&raw.roots).unwrap();
        let types: Vec<&str> = tree.nodes().iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, vec!["Hash Join", "Seq Scan", "Hash", "Seq Scan"]);
        assert_eq!(tree.node(0).unwrap().children, vec![1, 2]);
        assert_eq!(tree.node(2).unwrap().children, vec![3]);
    }

    #[test]
    fn test_text_estimates_and_actuals() {
        let raw = parse_postgres_explain(HASH_JOIN_TEXT).unwrap();
        let tree = normalize(&raw.roots).unwrap();

        let root = tree.node(0).unwrap();
        assert_eq!(root.startup_cost, Some(1.09));
        assert_eq!(root.total_cost, Some(2.19));
        assert_eq!(root.actual_startup_time, Some(0.050));
        assert_eq!(root.actual_total_time, Some(0.060));
        assert_eq!(root.actual_rows, Some(5));
        assert_eq!(root.extra.get("Plan Rows"), Some(&json!(5)));
        assert_eq!(root.extra.get("Actual Loops"), Some(&json!(1)));
        assert_eq!(root.extra.get("Join Type"), Some(&json!("Inner")));
        assert_eq!(root.extra_str("Hash Cond"), Some("(o.user_id = u.id)"));
    }

    #[test]
    fn test_text_relation_alias_and_properties() {
        let raw = parse_postgres_explain(HASH_JOIN_TEXT).unwrap();
        let tree = normalize(&raw.roots).unwrap();

        let orders = tree.node(1).unwrap();
        assert_eq!(orders.relation_name.as_deref(), Some("orders"));
        assert_eq!(orders.alias.as_deref(), Some("o"));
        assert_eq!(orders.extra_str("Filter"), Some("(amount > 100)"));
        assert_eq!(orders.extra.get("Rows Removed by Filter"), Some(&json!(3)));

        let users = tree.node(3).unwrap();
        assert_eq!(users.relation_name.as_deref(), Some("users"));
        assert_eq!(users.extra_str("Schema"), Some("public"));

        let hash = tree.node(2).unwrap();
        assert_eq!(hash.extra.get("Hash Buckets"), Some(&json!(1024)));
        assert_eq!(hash.extra.get("Hash Batches"), Some(&json!(1)));
        assert_eq!(hash.extra.get("Peak Memory Usage"), Some(&json!(9)));
    }

    #[test]
    fn test_text_index_scan_and_sort_method() {
        let text = "\
Sort  (cost=8.31..8.32 rows=1 width=40)
  Sort Key: created_at
  Sort Method: external merge  Disk: 2048kB
  ->  Index Scan using users_email_idx on users  (cost=0.29..8.30 rows=1 width=40)
        Index Cond: (email = 'a@b.c'::text)";

        let raw = parse_postgres_explain(text).unwrap();
        let tree = normalize(&raw.roots).unwrap();

        let sort = tree.node(0).unwrap();
        assert_eq!(sort.extra_str("Sort Method"), Some("external merge"));
        assert_eq!(sort.extra_str("Sort Space Type"), Some("Disk"));
        assert_eq!(sort.extra.get("Sort Space Used"), Some(&json!(2048)));

        let scan = tree.node(1).unwrap();
        assert_eq!(scan.node_type, "Index Scan");
        assert_eq!(scan.extra_str("Index Name"), Some("users_email_idx"));
        assert_eq!(scan.relation_name.as_deref(), Some("users"));
        assert_eq!(scan.alias.as_deref(), Some("users"));
        assert_eq!(scan.extra_str("Index Cond"), Some("(email = 'a@b.c'::text)"));
    }

    #[test]
    fn test_text_psql_decorations_skipped() {
        let text = "\
                         QUERY PLAN
------------------------------------------------------------
 Seq Scan on users  (cost=0.00..35.50 rows=2550 width=4)
(1 row)
";
        let raw = parse_postgres_explain(text).unwrap();
        assert_eq!(raw.roots.len(), 1);
        assert_eq!(raw.roots[0]["Node Type"], json!("Seq Scan"));
    }

    #[test]
    fn test_text_join_variants() {
        let text = "\
Nested Loop Left Join  (cost=0.00..10.00 rows=1 width=8)
  ->  Merge Anti Join  (cost=0.00..5.00 rows=1 width=8)
        ->  Seq Scan on a  (cost=0.00..1.00 rows=1 width=4)
  ->  Parallel Seq Scan on b  (cost=0.00..1.00 rows=1 width=4)";

        let raw = parse_postgres_explain(text).unwrap();
        let tree = normalize(&raw.roots).unwrap();

        assert_eq!(tree.node(0).unwrap().node_type, "Nested Loop");
        assert_eq!(tree.node(0).unwrap().extra_str("Join Type"), Some("Left"));
        assert_eq!(tree.node(1).unwrap().node_type, "Merge Join");
        assert_eq!(tree.node(1).unwrap().extra_str("Join Type"), Some("Anti"));
        let parallel = tree.node(3).unwrap();
        assert_eq!(parallel.node_type, "Seq Scan");
        assert_eq!(parallel.extra.get("Parallel Aware"), Some(&json!(true)));
    }

    #[test]
    fn test_text_aggregate_strategy() {
        let raw = parse_postgres_explain(
            "HashAggregate  (cost=1.00..2.00 rows=10 width=8)\n  Group Key: status\n  ->  Seq Scan on t  (cost=0.00..1.00 rows=10 width=4)",
        )
        .unwrap();
        let tree = normalize(&raw.roots).unwrap();
        assert_eq!(tree.node(0).unwrap().node_type, "Aggregate");
        assert_eq!(tree.node(0).unwrap().extra_str("Strategy"), Some("Hashed"));
        assert_eq!(tree.node(0).unwrap().extra_str("Group Key"), Some("status"));
    }

    #[test]
    fn test_text_never_executed() {
        let raw = parse_postgres_explain(
            "Limit  (cost=0.00..1.00 rows=1 width=4) (actual time=0.001..0.001 rows=0 loops=1)\n  ->  Seq Scan on t  (cost=0.00..1.00 rows=1 width=4) (never executed)",
        )
        .unwrap();
        let tree = normalize(&raw.roots).unwrap();
        let scan = tree.node(1).unwrap();
        assert_eq!(scan.actual_rows, None);
        assert_eq!(scan.extra.get("Actual Loops"), Some(&json!(0)));
    }

    #[test]
    fn test_text_subplan_labels_attach_to_next_node() {
        let text = "\
Seq Scan on users u  (cost=0.00..100.00 rows=10 width=4)
  Filter: (SubPlan 1)
  SubPlan 1
    ->  Index Scan using orders_user_idx on orders o  (cost=0.29..8.30 rows=1 width=4)
          Index Cond: (user_id = u.id)";

        let raw = parse_postgres_explain(text).unwrap();
        let tree = normalize(&raw.roots).unwrap();
        assert_eq!(tree.len(), 2);
        let sub = tree.node(1).unwrap();
        assert_eq!(sub.extra_str("Subplan Name"), Some("SubPlan 1"));
        assert_eq!(sub.extra_str("Parent Relationship"), Some("SubPlan"));
        assert_eq!(tree.parent_indices()[1], Some(0));
    }

    #[test]
    fn test_text_planning_trailer_ignored() {
        let text = "\
Seq Scan on t  (cost=0.00..1.00 rows=1 width=4)
Planning:
  Buffers: shared hit=3
Planning Time: 0.080 ms";
        let raw = parse_postgres_explain(text).unwrap();
        let tree = normalize(&raw.roots).unwrap();
        assert!(tree.node(0).unwrap().extra.get("Buffers").is_none());
        assert_eq!(raw.planning_time_ms, Some(0.080));
    }
}

mod helper_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_count_indent() {
        assert_eq!(count_indent("  ->  Seq Scan"), 2);
        assert_eq!(count_indent("Seq Scan"), 0);
    }

    #[test]
    fn test_extract_time_ms() {
        assert_eq!(extract_time_ms("Planning Time: 0.123 ms"), Some(0.123));
        assert_eq!(extract_time_ms("Execution Time: 45.678 ms"), Some(45.678));
        assert_eq!(extract_time_ms("Execution Time"), None);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0.00..35.50"), Some((0.0, 35.5)));
        assert_eq!(parse_range("12"), None);
    }
}
