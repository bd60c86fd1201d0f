//! Cockroach dialect adapter.
//!
//! The distributed variant shares most of the postgres grammar, so DDL and
//! grant/revoke statements delegate to the postgres builders; live
//! privileges come from `SHOW GRANTS`-style queries instead of catalog ACL
//! parsing, and the role-attribute set is the reduced cockroach one.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use dbkeeper_core::{OperatorError, OperatorResult};

use crate::adapter::{DialectAdapter, PrivSet, RoleFlagState, TableRef};
use crate::postgres::{classify_create_error, parse_catalog_bool, PostgresAdapter};
use crate::quote::{ident_pg, literal};
use crate::runner::SqlRunner;
use crate::version::{ServerProduct, ServerVersion};

pub struct CockroachAdapter {
    runner: Arc<dyn SqlRunner>,
    pg: PostgresAdapter,
}

impl CockroachAdapter {
    pub fn new(runner: Arc<dyn SqlRunner>) -> Self {
        Self {
            pg: PostgresAdapter::new(runner.clone()),
            runner,
        }
    }

    async fn show_grants(&self, sql: &str) -> OperatorResult<PrivSet> {
        let rows = self.runner.fetch_rows(sql).await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl DialectAdapter for CockroachAdapter {
    fn product(&self) -> ServerProduct {
        ServerProduct::Cockroach
    }

    async fn server_version(&self) -> OperatorResult<ServerVersion> {
        let raw = self
            .runner
            .fetch_scalar("SELECT version()")
            .await?
            .ok_or_else(|| OperatorError::backend("version probe returned no rows"))?;
        ServerVersion::parse(&raw)
    }

    async fn execute(&self, sql: &str) -> OperatorResult<()> {
        self.runner.execute(sql).await.map(|_| ())
    }

    async fn user_exists(&self, name: &str) -> OperatorResult<bool> {
        self.pg.user_exists(name).await
    }

    async fn create_user(&self, name: &str, password: Option<&str>) -> OperatorResult<()> {
        let mut sql = format!("CREATE USER {}", ident_pg(name));
        if let Some(pw) = password {
            sql.push_str(&format!(" WITH PASSWORD {}", literal(pw)));
        }
        debug!(user = name, "creating user");
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| classify_create_error(e, name))
    }

    async fn drop_user(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP USER IF EXISTS {}", ident_pg(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_users(&self) -> OperatorResult<Vec<String>> {
        self.pg.list_users().await
    }

    async fn database_exists(&self, name: &str) -> OperatorResult<bool> {
        self.pg.database_exists(name).await
    }

    async fn create_database(&self, name: &str, owner: Option<&str>) -> OperatorResult<()> {
        self.pg.create_database(name, owner).await
    }

    async fn drop_database(&self, name: &str) -> OperatorResult<()> {
        self.pg.drop_database(name).await
    }

    async fn list_databases(&self) -> OperatorResult<Vec<String>> {
        self.pg.list_databases().await
    }

    async fn schema_exists(&self, name: &str) -> OperatorResult<bool> {
        self.pg.schema_exists(name).await
    }

    async fn create_schema(&self, name: &str, owner: Option<&str>) -> OperatorResult<()> {
        self.pg.create_schema(name, owner).await
    }

    async fn drop_schema(&self, name: &str) -> OperatorResult<()> {
        self.pg.drop_schema(name).await
    }

    async fn list_schemas(&self) -> OperatorResult<Vec<String>> {
        self.pg.list_schemas().await
    }

    async fn role_attributes(&self, user: &str) -> OperatorResult<BTreeMap<String, bool>> {
        let sql = format!(
            "SELECT rolcreatedb::text, rolcreaterole::text, rolcanlogin::text \
             FROM pg_catalog.pg_roles WHERE rolname = {}",
            literal(user)
        );
        let rows = self.runner.fetch_rows(&sql).await?;
        let row = rows
            .first()
            .ok_or_else(|| OperatorError::not_found(format!("role {user}")))?;
        let mut attrs = BTreeMap::new();
        for (idx, name) in ["CREATEDB", "CREATEROLE", "LOGIN"].iter().enumerate() {
            if let Some(v) = row.get(idx) {
                attrs.insert((*name).to_string(), parse_catalog_bool(v));
            }
        }
        Ok(attrs)
    }

    async fn alter_role_attributes(
        &self,
        user: &str,
        flags: &[RoleFlagState],
    ) -> OperatorResult<()> {
        self.pg.alter_role_attributes(user, flags).await
    }

    async fn database_privileges(&self, user: &str, database: &str) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT privilege_type FROM [SHOW GRANTS ON DATABASE {} FOR {}]",
            ident_pg(database),
            ident_pg(user)
        );
        self.show_grants(&sql).await
    }

    async fn grant_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.grant_database(user, database, privs).await
    }

    async fn revoke_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.revoke_database(user, database, privs).await
    }

    async fn schema_privileges(&self, user: &str, schema: &str) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT privilege_type FROM [SHOW GRANTS ON SCHEMA {} FOR {}]",
            ident_pg(schema),
            ident_pg(user)
        );
        self.show_grants(&sql).await
    }

    async fn grant_schema(&self, user: &str, schema: &str, privs: &PrivSet) -> OperatorResult<()> {
        self.pg.grant_schema(user, schema, privs).await
    }

    async fn revoke_schema(
        &self,
        user: &str,
        schema: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.revoke_schema(user, schema, privs).await
    }

    async fn table_privileges(&self, user: &str, table: &TableRef) -> OperatorResult<PrivSet> {
        let ident = match &table.schema {
            Some(s) => format!("{}.{}", ident_pg(s), ident_pg(&table.table)),
            None => ident_pg(&table.table),
        };
        let sql = format!(
            "SELECT privilege_type FROM [SHOW GRANTS ON TABLE {} FOR {}]",
            ident,
            ident_pg(user)
        );
        self.show_grants(&sql).await
    }

    async fn grant_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.grant_table(user, table, privs).await
    }

    async fn revoke_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.revoke_table(user, table, privs).await
    }

    async fn default_table_privileges(
        &self,
        user: &str,
        grantor: &str,
    ) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT privilege_type FROM [SHOW DEFAULT PRIVILEGES FOR ROLE {}] \
             WHERE grantee = {} AND object_type = 'tables'",
            ident_pg(grantor),
            literal(user)
        );
        self.show_grants(&sql).await
    }

    async fn grant_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.grant_default_tables(user, grantor, privs).await
    }

    async fn revoke_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.pg.revoke_default_tables(user, grantor, privs).await
    }
}
