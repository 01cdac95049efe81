//! Query EXPLAIN Module
//!
//! Engine adapters turn native EXPLAIN output into the nested raw form:
//! - PostgreSQL (JSON and text formats)
//! - MySQL (JSON and tabular formats)
//! - SQLite (tree and row formats)
//!
//! The normalizer then flattens that form into a [`PlanTree`].
//!
//! # Example
//!
//! ```
//! use sqltrace_analyzer::explain::parse_explain;
//! use sqltrace_core::Engine;
//!
//! let pg_json = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users"}}]"#;
//! let plan = parse_explain(Engine::Postgres, pg_json).unwrap();
//! assert_eq!(plan.tree.node(0).unwrap().node_type, "Seq Scan");
//!
//! let sqlite_output = "QUERY PLAN\n|--SCAN users";
//! let plan = parse_explain(Engine::Sqlite, sqlite_output).unwrap();
//! assert_eq!(plan.tree.len(), 1);
//! ```

pub mod mysql;
pub mod normalize;
pub mod plan;
pub mod postgres;
pub mod sqlite;

pub use mysql::{
    parse_json_explain as parse_mysql_json_explain, parse_mysql_explain,
    parse_tabular_explain as parse_mysql_tabular_explain,
};
pub use normalize::{NormalizedPlan, PlanNormalizer, RawPlan, RawPlanFormat, normalize};
pub use plan::{NodeKind, PlanNode, PlanTree, PreOrder};
pub use postgres::{
    parse_json_explain as parse_postgres_json_explain, parse_postgres_explain,
    parse_text_explain as parse_postgres_text_explain,
};
pub use sqlite::{parse_sqlite_explain, parse_tree_format as parse_sqlite_tree};

use sqltrace_core::{Engine, ParseError};

/// Runs the adapter for `engine` over raw EXPLAIN output
pub fn adapt(engine: Engine, output: &str) -> Result<RawPlan, ParseError> {
    match engine {
        Engine::Postgres => parse_postgres_explain(output),
        Engine::Mysql => parse_mysql_explain(output),
        Engine::Sqlite => parse_sqlite_explain(output),
    }
}

/// Adapts and normalizes raw EXPLAIN output with the default field labels
pub fn parse_explain(engine: Engine, output: &str) -> Result<NormalizedPlan, ParseError> {
    adapt(engine, output)?.normalize(&PlanNormalizer::new())
}
