//! Plan Advisor Module
//!
//! Evaluates a fixed set of rules over a normalized plan and produces ordered
//! suggestions and a 0-100 performance score. It identifies large sequential
//! scans, expensive nested loops, sorts at risk of spilling and unused indexes.

mod engine;
mod rules;
mod suggestion;

pub use engine::{AdvisorConfig, AdvisorEngine};
pub use rules::AdvisorRule;
pub use suggestion::{
    AdvisorAnalysis, AnalysisSummary, Severity, Suggestion, SuggestionType, potential_improvement,
};
