//! Scripted SQL runner for adapter unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use dbkeeper_core::{OperatorError, OperatorResult};

use crate::runner::{SqlRow, SqlRunner};

/// Records every statement and replays queued query results in FIFO order.
pub(crate) struct ScriptedRunner {
    executed: Mutex<Vec<String>>,
    queried: Mutex<Vec<String>>,
    rows: Mutex<VecDeque<Vec<SqlRow>>>,
    execute_failure: Mutex<Option<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            queried: Mutex::new(Vec::new()),
            rows: Mutex::new(VecDeque::new()),
            execute_failure: Mutex::new(None),
        }
    }

    /// Queue one query result; replayed on the next `fetch_rows`.
    pub async fn push_rows(&self, rows: Vec<SqlRow>) {
        self.rows.lock().await.push_back(rows);
    }

    /// Make every subsequent `execute` fail with a backend error.
    pub async fn fail_execute(&self, message: &str) {
        *self.execute_failure.lock().await = Some(message.to_string());
    }

    pub async fn executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }

    pub async fn queried(&self) -> Vec<String> {
        self.queried.lock().await.clone()
    }
}

#[async_trait]
impl SqlRunner for ScriptedRunner {
    async fn execute(&self, sql: &str) -> OperatorResult<u64> {
        if let Some(message) = self.execute_failure.lock().await.clone() {
            return Err(OperatorError::backend(message));
        }
        self.executed.lock().await.push(sql.to_string());
        Ok(0)
    }

    async fn fetch_rows(&self, sql: &str) -> OperatorResult<Vec<SqlRow>> {
        self.queried.lock().await.push(sql.to_string());
        Ok(self.rows.lock().await.pop_front().unwrap_or_default())
    }
}
