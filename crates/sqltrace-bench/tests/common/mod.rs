//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use sqltrace_core::{Engine, ExecutionBackend, ExecutionOutput, Result, TraceError};
use std::sync::Arc;
use std::time::Duration;

/// Scripted reply to a query
#[derive(Debug, Clone)]
pub enum MockReply {
    /// EXPLAIN output, with the execution time the backend reports
    Plan {
        output: String,
        elapsed: Option<Duration>,
    },
    Fail(String),
    /// Sleeps this long before answering with the default plan
    Delay(Duration),
}

/// Mock backend for testing service logic without a real database.
///
/// Queries containing a registered pattern get that pattern's reply; any other
/// query gets the default plan.
pub struct MockBackend {
    pub engine: Engine,
    pub default_output: String,
    pub default_elapsed: Option<Duration>,
    pub responses: Vec<(String, MockReply)>,
    pub execute_count: Arc<parking_lot::Mutex<usize>>,
    /// Log of all queries executed, for assertion in tests
    pub query_log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            default_output: seq_scan_plan(),
            default_elapsed: Some(Duration::from_millis(5)),
            responses: vec![],
            execute_count: Arc::new(parking_lot::Mutex::new(0)),
            query_log: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn with_default_output(mut self, output: impl Into<String>) -> Self {
        self.default_output = output.into();
        self
    }

    /// Register a reply for queries containing the given SQL pattern.
    pub fn with_response(mut self, sql_contains: impl Into<String>, reply: MockReply) -> Self {
        self.responses.push((sql_contains.into(), reply));
        self
    }

    /// Queries containing the pattern take `elapsed` and return the default plan
    pub fn with_timing(self, sql_contains: impl Into<String>, elapsed: Duration) -> Self {
        let output = self.default_output.clone();
        self.with_response(
            sql_contains,
            MockReply::Plan {
                output,
                elapsed: Some(elapsed),
            },
        )
    }

    pub fn with_failure(self, sql_contains: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_response(sql_contains, MockReply::Fail(message.into()))
    }

    pub fn execute_count(&self) -> usize {
        *self.execute_count.lock()
    }

    pub fn query_log(&self) -> Vec<String> {
        self.query_log.lock().clone()
    }

    fn reply_for(&self, query: &str) -> Option<MockReply> {
        self.responses
            .iter()
            .find(|(pattern, _)| query.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
    }
}

#[async_trait]
impl ExecutionBackend for MockBackend {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(&self, query: &str, _timeout: Duration) -> Result<ExecutionOutput> {
        *self.execute_count.lock() += 1;
        self.query_log.lock().push(query.to_string());

        let default = || {
            let output = ExecutionOutput::new(self.engine, self.default_output.clone());
            match self.default_elapsed {
                Some(elapsed) => output.with_elapsed(elapsed),
                None => output,
            }
        };

        match self.reply_for(query) {
            None => Ok(default()),
            Some(MockReply::Plan { output, elapsed }) => {
                let output = ExecutionOutput::new(self.engine, output);
                Ok(match elapsed {
                    Some(elapsed) => output.with_elapsed(elapsed),
                    None => output,
                })
            }
            Some(MockReply::Fail(message)) => Err(TraceError::Execution(message)),
            Some(MockReply::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(default())
            }
        }
    }
}

/// A single sequential scan over 500000 users rows
pub fn seq_scan_plan() -> String {
    r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users",
        "Startup Cost": 0.0, "Total Cost": 9500.0, "Plan Rows": 500000,
        "Actual Rows": 500000, "Filter": "(email = 'a@b.c'::text)"},
        "Planning Time": 0.2, "Execution Time": 180.5}]"#
        .to_string()
}

/// An index scan that the advisor has nothing to say about
pub fn index_scan_plan() -> String {
    r#"[{"Plan": {"Node Type": "Index Scan", "Relation Name": "users",
        "Index Name": "users_email_idx", "Startup Cost": 0.42, "Total Cost": 8.44,
        "Plan Rows": 1, "Actual Rows": 1, "Index Cond": "(email = 'a@b.c'::text)"},
        "Planning Time": 0.1, "Execution Time": 0.05}]"#
        .to_string()
}

pub fn postgres_backend() -> MockBackend {
    MockBackend::new(Engine::Postgres)
}
