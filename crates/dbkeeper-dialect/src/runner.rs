//! The SQL execution seam.
//!
//! Dialect adapters never talk to a driver directly; they issue statements
//! through [`SqlRunner`], implemented over real connection pools in
//! dbkeeper-conn and over scripted fixtures in tests. Catalog queries select
//! text-typed columns only, so rows are plain string tuples.

use async_trait::async_trait;

use dbkeeper_core::OperatorResult;

/// One result row: positional, text-typed, nullable columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow {
    cols: Vec<Option<String>>,
}

impl SqlRow {
    pub fn new(cols: Vec<Option<String>>) -> Self {
        Self { cols }
    }

    /// Build a row of non-null text columns.
    pub fn of<I, S>(cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cols: cols.into_iter().map(|c| Some(c.into())).collect(),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.cols.get(idx).and_then(|c| c.as_deref())
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }
}

/// Executes statements on one live connection.
///
/// A runner is scoped to one (server, database, acting user) handle; callers
/// obtain it from the connection provider and must not retain it beyond the
/// reconciliation pass that requested it.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    /// Execute a statement, returning the affected-row count.
    async fn execute(&self, sql: &str) -> OperatorResult<u64>;

    /// Run a query and fetch all rows as text tuples.
    async fn fetch_rows(&self, sql: &str) -> OperatorResult<Vec<SqlRow>>;

    /// Run a query expected to yield at most one single-column row.
    async fn fetch_scalar(&self, sql: &str) -> OperatorResult<Option<String>> {
        let rows = self.fetch_rows(sql).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.get(0).map(str::to_string)))
    }
}
