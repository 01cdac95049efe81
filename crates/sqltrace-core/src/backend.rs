//! Execution backend contract
//!
//! SQLTrace never talks to a database itself. Whatever owns the connection
//! (a driver pool, a test double, a remote agent) implements
//! [`ExecutionBackend`] and hands back the raw EXPLAIN text for a query.

use crate::engine::Engine;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Raw output of one query execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Engine that produced the output; selects the plan adapter
    pub engine: Engine,
    /// EXPLAIN output exactly as the engine returned it
    pub explain_output: String,
    /// Execution time measured by the backend, if it measured one
    pub elapsed: Option<Duration>,
}

impl ExecutionOutput {
    pub fn new(engine: Engine, explain_output: impl Into<String>) -> Self {
        Self {
            engine,
            explain_output: explain_output.into(),
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Runs a query and returns its EXPLAIN output.
///
/// `timeout` is advisory: callers also bound the returned future themselves
/// and drop it once the deadline passes, so implementations must tolerate
/// being cancelled at any await point.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Engine this backend is connected to
    fn engine(&self) -> Engine;

    async fn execute(&self, query: &str, timeout: Duration) -> Result<ExecutionOutput>;
}

#[async_trait]
impl<T: ExecutionBackend + ?Sized> ExecutionBackend for Arc<T> {
    fn engine(&self) -> Engine {
        (**self).engine()
    }

    async fn execute(&self, query: &str, timeout: Duration) -> Result<ExecutionOutput> {
        (**self).execute(query, timeout).await
    }
}
