//! Supported database engines

use crate::error::TraceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database engine whose EXPLAIN output is being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Postgres,
    Mysql,
    Sqlite,
}

impl Engine {
    pub const ALL: [Engine; 3] = [Engine::Postgres, Engine::Mysql, Engine::Sqlite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Mysql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Builds the EXPLAIN statement whose output the matching plan adapter understands.
    ///
    /// With `analyze` the query is actually executed where the engine supports it,
    /// so the plan carries measured times and row counts. SQLite has no such mode.
    pub fn explain_statement(&self, query: &str, analyze: bool) -> String {
        let query = query.trim().trim_end_matches(';');
        match (self, analyze) {
            (Self::Postgres, true) => format!("EXPLAIN (ANALYZE, FORMAT JSON) {query}"),
            (Self::Postgres, false) => format!("EXPLAIN (FORMAT JSON) {query}"),
            (Self::Mysql, _) => format!("EXPLAIN FORMAT=JSON {query}"),
            (Self::Sqlite, _) => format!("EXPLAIN QUERY PLAN {query}"),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Engine {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(TraceError::Configuration(format!(
                "unknown database engine '{other}'"
            ))),
        }
    }
}
