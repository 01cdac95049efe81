//! SQLTrace Analyzer - EXPLAIN plan normalization and analysis
//!
//! This crate provides functionality for:
//! - Turning EXPLAIN output from PostgreSQL, MySQL, and SQLite into one plan tree
//! - Whole-plan metrics
//! - Rule-based optimization suggestions and a performance score

pub mod advisor;
pub mod explain;
pub mod metrics;

pub use advisor::*;
pub use explain::{
    NodeKind, NormalizedPlan, PlanNode, PlanNormalizer, PlanTree, RawPlan, RawPlanFormat, adapt,
    parse_explain,
};
pub use metrics::{PlanMetrics, aggregate};
