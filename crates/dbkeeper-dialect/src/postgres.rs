//! Postgres dialect adapter.
//!
//! The primary dialect. Live privileges come from catalog ACL parsing
//! (`pg_database.datacl`, `pg_default_acl`), `has_schema_privilege` probes
//! for schema scope and `information_schema.role_table_grants` for tables.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use dbkeeper_core::{OperatorError, OperatorResult};

use crate::acl::privileges_for_grantee;
use crate::adapter::{priv_list, DialectAdapter, PrivSet, RoleFlagState, TableRef};
use crate::quote::{ident_pg, literal};
use crate::runner::SqlRunner;
use crate::version::{ServerProduct, ServerVersion};

/// Map a backend "duplicate object" failure to AlreadyExists.
pub(crate) fn classify_create_error(err: OperatorError, identifier: &str) -> OperatorError {
    let text = err.to_string().to_ascii_lowercase();
    if text.contains("already exists") || text.contains("duplicate") {
        OperatorError::already_exists(identifier)
    } else {
        err
    }
}

pub(crate) fn parse_catalog_bool(raw: &str) -> bool {
    matches!(raw, "t" | "true" | "on" | "1")
}

/// Render role flags for `ALTER ROLE ... WITH`: `CREATEDB NOLOGIN ...`.
pub(crate) fn flag_clause(flags: &[RoleFlagState]) -> String {
    flags
        .iter()
        .map(|f| {
            if f.value {
                f.name.clone()
            } else {
                format!("NO{}", f.name)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct PostgresAdapter {
    runner: Arc<dyn SqlRunner>,
}

impl PostgresAdapter {
    pub fn new(runner: Arc<dyn SqlRunner>) -> Self {
        Self { runner }
    }

    pub(crate) fn runner(&self) -> &dyn SqlRunner {
        self.runner.as_ref()
    }

    fn table_ident(table: &TableRef) -> String {
        match &table.schema {
            Some(s) => format!("{}.{}", ident_pg(s), ident_pg(&table.table)),
            None => ident_pg(&table.table),
        }
    }

    async fn probe_schema_privileges(
        &self,
        user: &str,
        schema: &str,
        candidates: &[&str],
    ) -> OperatorResult<PrivSet> {
        let mut held = BTreeSet::new();
        for candidate in candidates {
            let sql = format!(
                "SELECT has_schema_privilege({}, {}, {})::text",
                literal(user),
                literal(schema),
                literal(candidate)
            );
            if let Some(v) = self.runner.fetch_scalar(&sql).await? {
                if parse_catalog_bool(&v) {
                    held.insert((*candidate).to_string());
                }
            }
        }
        Ok(held)
    }
}

#[async_trait]
impl DialectAdapter for PostgresAdapter {
    fn product(&self) -> ServerProduct {
        ServerProduct::Postgres
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
        let sql = format!(
            "SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = {}",
            literal(name)
        );
        Ok(self.runner.fetch_scalar(&sql).await?.is_some())
    }

    async fn create_user(&self, name: &str, password: Option<&str>) -> OperatorResult<()> {
        let mut sql = format!("CREATE ROLE {} LOGIN", ident_pg(name));
        if let Some(pw) = password {
            sql.push_str(&format!(" PASSWORD {}", literal(pw)));
        }
        debug!(role = name, "creating role");
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| classify_create_error(e, name))
    }

    async fn drop_user(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP ROLE IF EXISTS {}", ident_pg(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_users(&self) -> OperatorResult<Vec<String>> {
        let rows = self
            .runner
            .fetch_rows(
                "SELECT rolname FROM pg_catalog.pg_roles \
                 WHERE rolname NOT LIKE 'pg\\_%' ORDER BY rolname",
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn database_exists(&self, name: &str) -> OperatorResult<bool> {
        let sql = format!(
            "SELECT 1 FROM pg_catalog.pg_database WHERE datname = {}",
            literal(name)
        );
        Ok(self.runner.fetch_scalar(&sql).await?.is_some())
    }

    async fn create_database(&self, name: &str, owner: Option<&str>) -> OperatorResult<()> {
        let mut sql = format!("CREATE DATABASE {}", ident_pg(name));
        if let Some(owner) = owner {
            sql.push_str(&format!(" OWNER {}", ident_pg(owner)));
        }
        debug!(database = name, "creating database");
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| classify_create_error(e, name))
    }

    async fn drop_database(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP DATABASE IF EXISTS {}", ident_pg(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_databases(&self) -> OperatorResult<Vec<String>> {
        let rows = self
            .runner
            .fetch_rows(
                "SELECT datname FROM pg_catalog.pg_database \
                 WHERE datistemplate = false ORDER BY datname",
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn schema_exists(&self, name: &str) -> OperatorResult<bool> {
        let sql = format!(
            "SELECT 1 FROM information_schema.schemata WHERE schema_name = {}",
            literal(name)
        );
        Ok(self.runner.fetch_scalar(&sql).await?.is_some())
    }

    async fn create_schema(&self, name: &str, owner: Option<&str>) -> OperatorResult<()> {
        let mut sql = format!("CREATE SCHEMA {}", ident_pg(name));
        if let Some(owner) = owner {
            sql.push_str(&format!(" AUTHORIZATION {}", ident_pg(owner)));
        }
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| classify_create_error(e, name))
    }

    async fn drop_schema(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP SCHEMA IF EXISTS {}", ident_pg(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_schemas(&self) -> OperatorResult<Vec<String>> {
        let rows = self
            .runner
            .fetch_rows(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY schema_name",
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn role_attributes(&self, user: &str) -> OperatorResult<BTreeMap<String, bool>> {
        let sql = format!(
            "SELECT rolsuper::text, rolcreatedb::text, rolcreaterole::text, \
             rolcanlogin::text, rolinherit::text, rolreplication::text, \
             rolbypassrls::text FROM pg_catalog.pg_roles WHERE rolname = {}",
            literal(user)
        );
        let rows = self.runner.fetch_rows(&sql).await?;
        let row = rows
            .first()
            .ok_or_else(|| OperatorError::not_found(format!("role {user}")))?;
        let names = [
            "SUPERUSER",
            "CREATEDB",
            "CREATEROLE",
            "LOGIN",
            "INHERIT",
            "REPLICATION",
            "BYPASSRLS",
        ];
        let mut attrs = BTreeMap::new();
        for (idx, name) in names.iter().enumerate() {
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
        if flags.is_empty() {
            return Ok(());
        }
        let sql = format!("ALTER ROLE {} WITH {}", ident_pg(user), flag_clause(flags));
        debug!(role = user, "altering role attributes");
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn database_privileges(&self, user: &str, database: &str) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT a.privilege_type FROM \
             (SELECT (aclexplode(datacl)).* FROM pg_catalog.pg_database \
              WHERE datname = {}) a \
             JOIN pg_catalog.pg_roles r ON a.grantee = r.oid \
             WHERE r.rolname = {}",
            literal(database),
            literal(user)
        );
        let rows = self.runner.fetch_rows(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn grant_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "GRANT {} ON DATABASE {} TO {}",
            priv_list(privs),
            ident_pg(database),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn revoke_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "REVOKE {} ON DATABASE {} FROM {}",
            priv_list(privs),
            ident_pg(database),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn schema_privileges(&self, user: &str, schema: &str) -> OperatorResult<PrivSet> {
        self.probe_schema_privileges(user, schema, &["CREATE", "USAGE"])
            .await
    }

    async fn grant_schema(&self, user: &str, schema: &str, privs: &PrivSet) -> OperatorResult<()> {
        let sql = format!(
            "GRANT {} ON SCHEMA {} TO {}",
            priv_list(privs),
            ident_pg(schema),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn revoke_schema(
        &self,
        user: &str,
        schema: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "REVOKE {} ON SCHEMA {} FROM {}",
            priv_list(privs),
            ident_pg(schema),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn table_privileges(&self, user: &str, table: &TableRef) -> OperatorResult<PrivSet> {
        let mut sql = format!(
            "SELECT privilege_type FROM information_schema.role_table_grants \
             WHERE grantee = {} AND table_name = {}",
            literal(user),
            literal(&table.table)
        );
        if let Some(schema) = &table.schema {
            sql.push_str(&format!(" AND table_schema = {}", literal(schema)));
        }
        let rows = self.runner.fetch_rows(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn grant_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "GRANT {} ON TABLE {} TO {}",
            priv_list(privs),
            Self::table_ident(table),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn revoke_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "REVOKE {} ON TABLE {} FROM {}",
            priv_list(privs),
            Self::table_ident(table),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn default_table_privileges(
        &self,
        user: &str,
        grantor: &str,
    ) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT d.defaclacl::text FROM pg_catalog.pg_default_acl d \
             JOIN pg_catalog.pg_roles g ON d.defaclrole = g.oid \
             WHERE g.rolname = {} AND d.defaclobjtype = 'r'",
            literal(grantor)
        );
        let rows = self.runner.fetch_rows(&sql).await?;
        let mut privs = BTreeSet::new();
        for row in &rows {
            if let Some(acl) = row.get(0) {
                privs.extend(privileges_for_grantee(acl, user));
            }
        }
        Ok(privs)
    }

    async fn grant_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {} GRANT {} ON TABLES TO {}",
            ident_pg(grantor),
            priv_list(privs),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn revoke_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        let sql = format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {} REVOKE {} ON TABLES FROM {}",
            ident_pg(grantor),
            priv_list(privs),
            ident_pg(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }
}
