//! SQLTrace Core - shared types for plan analysis and benchmarking
//!
//! This crate provides the pieces every other SQLTrace crate depends on:
//!
//! - `TraceError` / `ParseError` - the error taxonomy, with plan paths for parse failures
//! - `Engine` - the supported database engines
//! - `ExecutionBackend` - the contract for whatever actually runs EXPLAIN against a database
//! - `logging` - tracing subscriber setup

mod backend;
mod engine;
mod error;
pub mod logging;

pub use backend::*;
pub use engine::*;
pub use error::*;
