//! MySQL dialect adapter.
//!
//! The divergent dialect: account names are host-qualified, grants target
//! `` `db`.* `` or `` `db`.`table` ``, live privileges come from the
//! `information_schema` privilege tables, and there is no schema object,
//! role-attribute concept or default-ACL equivalent.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use dbkeeper_core::{OperatorError, OperatorResult};

use crate::adapter::{priv_list, DialectAdapter, PrivSet, RoleFlagState, TableRef};
use crate::quote::{account_mysql, ident_mysql, literal};
use crate::runner::SqlRunner;
use crate::version::{ServerProduct, ServerVersion};

pub struct MySqlAdapter {
    runner: Arc<dyn SqlRunner>,
    /// Database the underlying handle is attached to; qualifies table
    /// grants when the spec names no database explicitly.
    database: String,
}

impl MySqlAdapter {
    pub fn new(runner: Arc<dyn SqlRunner>, database: impl Into<String>) -> Self {
        Self {
            runner,
            database: database.into(),
        }
    }

    /// `information_schema` stores grantees as `'user'@'%'` text.
    fn grantee_literal(user: &str) -> String {
        literal(&format!("'{user}'@'%'"))
    }

    fn table_database<'a>(&'a self, table: &'a TableRef) -> &'a str {
        table.schema.as_deref().unwrap_or(&self.database)
    }

    fn classify_create(err: OperatorError, identifier: &str) -> OperatorError {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("already exists")
            || text.contains("duplicate")
            || text.contains("operation create user failed")
        {
            OperatorError::already_exists(identifier)
        } else {
            err
        }
    }
}

#[async_trait]
impl DialectAdapter for MySqlAdapter {
    fn product(&self) -> ServerProduct {
        ServerProduct::MySql
    }

    async fn server_version(&self) -> OperatorResult<ServerVersion> {
        let raw = self
            .runner
            .fetch_scalar("SELECT VERSION()")
            .await?
            .ok_or_else(|| OperatorError::backend("version probe returned no rows"))?;
        ServerVersion::parse(&raw)
    }

    async fn execute(&self, sql: &str) -> OperatorResult<()> {
        self.runner.execute(sql).await.map(|_| ())
    }

    async fn user_exists(&self, name: &str) -> OperatorResult<bool> {
        let sql = format!(
            "SELECT 1 FROM mysql.user WHERE User = {} AND Host = '%'",
            literal(name)
        );
        Ok(self.runner.fetch_scalar(&sql).await?.is_some())
    }

    async fn create_user(&self, name: &str, password: Option<&str>) -> OperatorResult<()> {
        let mut sql = format!("CREATE USER {}", account_mysql(name));
        if let Some(pw) = password {
            sql.push_str(&format!(" IDENTIFIED BY {}", literal(pw)));
        }
        debug!(user = name, "creating user");
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| Self::classify_create(e, name))
    }

    async fn drop_user(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP USER IF EXISTS {}", account_mysql(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_users(&self) -> OperatorResult<Vec<String>> {
        let rows = self
            .runner
            .fetch_rows("SELECT User FROM mysql.user WHERE Host = '%' ORDER BY User")
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn database_exists(&self, name: &str) -> OperatorResult<bool> {
        let sql = format!(
            "SELECT 1 FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {}",
            literal(name)
        );
        Ok(self.runner.fetch_scalar(&sql).await?.is_some())
    }

    async fn create_database(&self, name: &str, owner: Option<&str>) -> OperatorResult<()> {
        if owner.is_some() {
            debug!(database = name, "mysql has no database owner; ignoring");
        }
        let sql = format!("CREATE DATABASE {}", ident_mysql(name));
        self.runner
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| Self::classify_create(e, name))
    }

    async fn drop_database(&self, name: &str) -> OperatorResult<()> {
        let sql = format!("DROP DATABASE IF EXISTS {}", ident_mysql(name));
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn list_databases(&self) -> OperatorResult<Vec<String>> {
        let rows = self
            .runner
            .fetch_rows(
                "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA \
                 WHERE SCHEMA_NAME NOT IN \
                 ('mysql', 'information_schema', 'performance_schema', 'sys') \
                 ORDER BY SCHEMA_NAME",
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn schema_exists(&self, _name: &str) -> OperatorResult<bool> {
        Err(OperatorError::unsupported("mysql", "schema objects"))
    }

    async fn create_schema(&self, _name: &str, _owner: Option<&str>) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "schema objects"))
    }

    async fn drop_schema(&self, _name: &str) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "schema objects"))
    }

    async fn list_schemas(&self) -> OperatorResult<Vec<String>> {
        Err(OperatorError::unsupported("mysql", "schema objects"))
    }

    async fn role_attributes(&self, _user: &str) -> OperatorResult<BTreeMap<String, bool>> {
        // No role-attribute concept; the empty map pairs with the empty
        // valid-flag vocabulary so any requested flag fails validation.
        Ok(BTreeMap::new())
    }

    async fn alter_role_attributes(
        &self,
        _user: &str,
        _flags: &[RoleFlagState],
    ) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "role attributes"))
    }

    async fn database_privileges(&self, user: &str, database: &str) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT PRIVILEGE_TYPE FROM information_schema.SCHEMA_PRIVILEGES \
             WHERE GRANTEE = {} AND TABLE_SCHEMA = {}",
            Self::grantee_literal(user),
            literal(database)
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
            "GRANT {} ON {}.* TO {}",
            priv_list(privs),
            ident_mysql(database),
            account_mysql(user)
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
            "REVOKE {} ON {}.* FROM {}",
            priv_list(privs),
            ident_mysql(database),
            account_mysql(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn schema_privileges(&self, _user: &str, _schema: &str) -> OperatorResult<PrivSet> {
        Err(OperatorError::unsupported("mysql", "schema privileges"))
    }

    async fn grant_schema(
        &self,
        _user: &str,
        _schema: &str,
        _privs: &PrivSet,
    ) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "schema privileges"))
    }

    async fn revoke_schema(
        &self,
        _user: &str,
        _schema: &str,
        _privs: &PrivSet,
    ) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "schema privileges"))
    }

    async fn table_privileges(&self, user: &str, table: &TableRef) -> OperatorResult<PrivSet> {
        let sql = format!(
            "SELECT PRIVILEGE_TYPE FROM information_schema.TABLE_PRIVILEGES \
             WHERE GRANTEE = {} AND TABLE_SCHEMA = {} AND TABLE_NAME = {}",
            Self::grantee_literal(user),
            literal(self.table_database(table)),
            literal(&table.table)
        );
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
            "GRANT {} ON {}.{} TO {}",
            priv_list(privs),
            ident_mysql(self.table_database(table)),
            ident_mysql(&table.table),
            account_mysql(user)
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
            "REVOKE {} ON {}.{} FROM {}",
            priv_list(privs),
            ident_mysql(self.table_database(table)),
            ident_mysql(&table.table),
            account_mysql(user)
        );
        self.runner.execute(&sql).await.map(|_| ())
    }

    async fn default_table_privileges(
        &self,
        _user: &str,
        _grantor: &str,
    ) -> OperatorResult<PrivSet> {
        Err(OperatorError::unsupported("mysql", "default privileges"))
    }

    async fn grant_default_tables(
        &self,
        _user: &str,
        _grantor: &str,
        _privs: &PrivSet,
    ) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "default privileges"))
    }

    async fn revoke_default_tables(
        &self,
        _user: &str,
        _grantor: &str,
        _privs: &PrivSet,
    ) -> OperatorResult<()> {
        Err(OperatorError::unsupported("mysql", "default privileges"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SqlRow;
    use crate::testing::ScriptedRunner;

    fn privs(tokens: &[&str]) -> PrivSet {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn database_grant_targets_star_and_account() {
        let runner = Arc::new(ScriptedRunner::new());
        let adapter = MySqlAdapter::new(runner.clone(), "appdb");
        adapter
            .grant_database("app", "appdb", &privs(&["INSERT", "SELECT"]))
            .await
            .unwrap();
        assert_eq!(
            runner.executed().await,
            vec!["GRANT INSERT, SELECT ON `appdb`.* TO 'app'@'%'"]
        );
    }

    #[tokio::test]
    async fn table_grant_falls_back_to_bound_database() {
        let runner = Arc::new(ScriptedRunner::new());
        let adapter = MySqlAdapter::new(runner.clone(), "appdb");
        let table = TableRef::new(None, "orders");
        adapter
            .grant_table("app", &table, &privs(&["SELECT"]))
            .await
            .unwrap();
        assert_eq!(
            runner.executed().await,
            vec!["GRANT SELECT ON `appdb`.`orders` TO 'app'@'%'"]
        );
    }

    #[tokio::test]
    async fn grantee_filter_matches_information_schema_format() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_rows(vec![SqlRow::of(["SELECT"])]).await;
        let adapter = MySqlAdapter::new(runner.clone(), "appdb");
        let got = adapter.database_privileges("app", "appdb").await.unwrap();
        assert!(got.contains("SELECT"));
        let queries = runner.queried().await;
        assert!(queries[0].contains("GRANTEE = '''app''@''%'''"));
    }

    #[tokio::test]
    async fn schema_and_default_scopes_are_unsupported() {
        let runner = Arc::new(ScriptedRunner::new());
        let adapter = MySqlAdapter::new(runner, "appdb");
        assert!(adapter
            .schema_privileges("app", "reporting")
            .await
            .unwrap_err()
            .is_invalid_spec());
        assert!(adapter
            .default_table_privileges("app", "owner")
            .await
            .unwrap_err()
            .is_invalid_spec());
    }
}
