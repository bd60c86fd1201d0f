//! sqlx-backed connection handles.
//!
//! A [`Handle`] wraps one lazily-created pool and exposes it as a
//! [`SqlRunner`]. The [`PoolFactory`] seam exists so the provider's caching
//! discipline can be exercised without a live server.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{MySqlPool, PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use dbkeeper_core::{OperatorError, OperatorResult};
use dbkeeper_dialect::{ServerProduct, SqlRow, SqlRunner};

use crate::resolver::{Credential, ServerInfo};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: u32 = 2;

/// One open connection handle, owned by the provider.
#[derive(Clone)]
pub struct Handle {
    runner: Arc<dyn SqlRunner>,
    closer: Arc<dyn HandleCloser>,
}

impl Handle {
    pub fn new(runner: Arc<dyn SqlRunner>, closer: Arc<dyn HandleCloser>) -> Self {
        Self { runner, closer }
    }

    pub fn runner(&self) -> Arc<dyn SqlRunner> {
        self.runner.clone()
    }

    pub async fn close(&self) {
        self.closer.close().await;
    }
}

/// Releases the underlying pool.
#[async_trait]
pub trait HandleCloser: Send + Sync {
    async fn close(&self);
}

/// Opens handles for a resolved server.
#[async_trait]
pub trait PoolFactory: Send + Sync {
    async fn open(
        &self,
        server: &ServerInfo,
        database: &str,
        credential: &Credential,
    ) -> OperatorResult<Handle>;
}

/// The real factory: postgres-family servers get a `PgPool`, mysql servers
/// a `MySqlPool`.
pub struct SqlxPoolFactory;

#[async_trait]
impl PoolFactory for SqlxPoolFactory {
    async fn open(
        &self,
        server: &ServerInfo,
        database: &str,
        credential: &Credential,
    ) -> OperatorResult<Handle> {
        debug!(
            host = %server.host,
            database,
            user = %credential.username,
            "opening connection pool"
        );
        match server.product {
            ServerProduct::Postgres | ServerProduct::Cockroach => {
                let url = format!(
                    "postgres://{}:{}@{}:{}/{}",
                    credential.username, credential.password, server.host, server.port, database
                );
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect(&url)
                    .await
                    .map_err(|e| {
                        OperatorError::connection_with_source(
                            format!("failed to connect to {}:{}/{database}", server.host, server.port),
                            e,
                        )
                    })?;
                let runner = Arc::new(PgRunner { pool: pool.clone() });
                Ok(Handle::new(runner, Arc::new(PgCloser { pool })))
            }
            ServerProduct::MySql => {
                let url = format!(
                    "mysql://{}:{}@{}:{}/{}",
                    credential.username, credential.password, server.host, server.port, database
                );
                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect(&url)
                    .await
                    .map_err(|e| {
                        OperatorError::connection_with_source(
                            format!("failed to connect to {}:{}/{database}", server.host, server.port),
                            e,
                        )
                    })?;
                let runner = Arc::new(MySqlRunner { pool: pool.clone() });
                Ok(Handle::new(runner, Arc::new(MySqlCloser { pool })))
            }
        }
    }
}

struct PgRunner {
    pool: PgPool,
}

struct PgCloser {
    pool: PgPool,
}

#[async_trait]
impl HandleCloser for PgCloser {
    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SqlRunner for PgRunner {
    async fn execute(&self, sql: &str) -> OperatorResult<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| OperatorError::backend_with_source(format!("statement failed: {e}"), e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_rows(&self, sql: &str) -> OperatorResult<Vec<SqlRow>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OperatorError::backend_with_source(format!("query failed: {e}"), e))?;
        Ok(rows.iter().map(decode_pg_row).collect())
    }
}

fn decode_pg_row(row: &PgRow) -> SqlRow {
    let cols = (0..row.len()).map(|idx| decode_pg_column(row, idx)).collect();
    SqlRow::new(cols)
}

// Catalog queries mostly cast to ::text, but existence probes and counts
// come back as other scalar types; fall through the common ones.
fn decode_pg_column(row: &PgRow, idx: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(|b| if b { "t" } else { "f" }.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    None
}

struct MySqlRunner {
    pool: MySqlPool,
}

struct MySqlCloser {
    pool: MySqlPool,
}

#[async_trait]
impl HandleCloser for MySqlCloser {
    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SqlRunner for MySqlRunner {
    async fn execute(&self, sql: &str) -> OperatorResult<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| OperatorError::backend_with_source(format!("statement failed: {e}"), e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_rows(&self, sql: &str) -> OperatorResult<Vec<SqlRow>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OperatorError::backend_with_source(format!("query failed: {e}"), e))?;
        Ok(rows.iter().map(decode_mysql_row).collect())
    }
}

fn decode_mysql_row(row: &MySqlRow) -> SqlRow {
    let cols = (0..row.len())
        .map(|idx| decode_mysql_column(row, idx))
        .collect();
    SqlRow::new(cols)
}

fn decode_mysql_column(row: &MySqlRow, idx: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(|n| n.to_string());
    }
    None
}
