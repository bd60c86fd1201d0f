//! The dialect adapter capability set.
//!
//! One fixed interface over the three supported backends. Dialect divergence
//! (grant syntax, catalog shape, privilege vocabulary) lives entirely inside
//! the implementations; callers — the resource strategies and the privilege
//! convergence engine — are dialect-agnostic.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use dbkeeper_core::OperatorResult;

use crate::cockroach::CockroachAdapter;
use crate::mysql::MySqlAdapter;
use crate::postgres::PostgresAdapter;
use crate::runner::SqlRunner;
use crate::version::{ServerProduct, ServerVersion};

/// A normalized set of privilege tokens for one scope.
pub type PrivSet = BTreeSet<String>;

/// One server-level role attribute and its desired boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFlagState {
    pub name: String,
    pub value: bool,
}

impl RoleFlagState {
    pub fn new(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A table reference, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: Option<String>, table: impl Into<String>) -> Self {
        Self {
            schema,
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// The fixed per-backend capability set.
///
/// An adapter is bound to one connection handle and, for statement scoping,
/// knows which database that handle is attached to. It holds no state of its
/// own beyond that binding.
#[async_trait]
pub trait DialectAdapter: Send + Sync {
    fn product(&self) -> ServerProduct;

    /// Probe and parse the server version. Called at most once per
    /// reconciliation pass; results are never cached across passes.
    async fn server_version(&self) -> OperatorResult<ServerVersion>;

    /// Execute an arbitrary statement.
    async fn execute(&self, sql: &str) -> OperatorResult<()>;

    async fn user_exists(&self, name: &str) -> OperatorResult<bool>;
    async fn create_user(&self, name: &str, password: Option<&str>) -> OperatorResult<()>;
    async fn drop_user(&self, name: &str) -> OperatorResult<()>;
    async fn list_users(&self) -> OperatorResult<Vec<String>>;

    async fn database_exists(&self, name: &str) -> OperatorResult<bool>;
    async fn create_database(&self, name: &str, owner: Option<&str>) -> OperatorResult<()>;
    async fn drop_database(&self, name: &str) -> OperatorResult<()>;
    async fn list_databases(&self) -> OperatorResult<Vec<String>>;

    async fn schema_exists(&self, name: &str) -> OperatorResult<bool>;
    async fn create_schema(&self, name: &str, owner: Option<&str>) -> OperatorResult<()>;
    async fn drop_schema(&self, name: &str) -> OperatorResult<()>;
    async fn list_schemas(&self) -> OperatorResult<Vec<String>>;

    /// Live server-level role attributes, keyed by flag name.
    async fn role_attributes(&self, user: &str) -> OperatorResult<BTreeMap<String, bool>>;

    /// Apply role attributes in one ALTER statement carrying all flags.
    async fn alter_role_attributes(
        &self,
        user: &str,
        flags: &[RoleFlagState],
    ) -> OperatorResult<()>;

    async fn database_privileges(&self, user: &str, database: &str) -> OperatorResult<PrivSet>;
    async fn grant_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()>;
    async fn revoke_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()>;

    async fn schema_privileges(&self, user: &str, schema: &str) -> OperatorResult<PrivSet>;
    async fn grant_schema(&self, user: &str, schema: &str, privs: &PrivSet) -> OperatorResult<()>;
    async fn revoke_schema(&self, user: &str, schema: &str, privs: &PrivSet)
        -> OperatorResult<()>;

    async fn table_privileges(&self, user: &str, table: &TableRef) -> OperatorResult<PrivSet>;
    async fn grant_table(&self, user: &str, table: &TableRef, privs: &PrivSet)
        -> OperatorResult<()>;
    async fn revoke_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()>;

    /// Privileges auto-granted on future tables created by `grantor`.
    async fn default_table_privileges(&self, user: &str, grantor: &str)
        -> OperatorResult<PrivSet>;
    async fn grant_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()>;
    async fn revoke_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()>;
}

/// Select the adapter implementation for a backend product.
///
/// `database` is the database the runner's handle is attached to; mysql
/// needs it to qualify table grants.
pub fn adapter_for(
    product: ServerProduct,
    runner: Arc<dyn SqlRunner>,
    database: impl Into<String>,
) -> Arc<dyn DialectAdapter> {
    match product {
        ServerProduct::Postgres => Arc::new(PostgresAdapter::new(runner)),
        ServerProduct::Cockroach => Arc::new(CockroachAdapter::new(runner)),
        ServerProduct::MySql => Arc::new(MySqlAdapter::new(runner, database)),
    }
}

/// Render a privilege set as a statement fragment (`SELECT, INSERT`).
pub(crate) fn priv_list(privs: &PrivSet) -> String {
    privs.iter().cloned().collect::<Vec<_>>().join(", ")
}
