//! Shared fakes: a stateful in-memory dialect adapter and an adapter
//! source that hands it out.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dbkeeper_conn::Credential;
use dbkeeper_core::{OperatorError, OperatorResult};
use dbkeeper_dialect::{
    DialectAdapter, PrivSet, RoleFlagState, ServerProduct, ServerVersion, TableRef,
};
use dbkeeper_resources::AdapterSource;

#[derive(Default)]
pub struct MockState {
    pub users: BTreeSet<String>,
    pub databases: BTreeSet<String>,
    pub schemas: BTreeSet<String>,
    /// Privileges keyed by (user, scoped name) where the scoped name is
    /// prefixed with its scope kind.
    pub privs: BTreeMap<(String, String), PrivSet>,
    pub role_flags: BTreeMap<String, BTreeMap<String, bool>>,
    pub log: Vec<String>,
}

/// In-memory adapter that applies every statement to its own state, so a
/// second convergence pass observes the first one's effects.
pub struct MockAdapter {
    product: ServerProduct,
    pub state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new(product: ServerProduct) -> Self {
        Self {
            product,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains(name)
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.state.lock().unwrap().users.contains(name)
    }

    fn privileges(&self, user: &str, scoped: &str) -> PrivSet {
        self.state
            .lock()
            .unwrap()
            .privs
            .get(&(user.to_string(), scoped.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn apply_grant(&self, user: &str, scoped: &str, privs: &PrivSet, stmt: String) {
        let mut state = self.state.lock().unwrap();
        state
            .privs
            .entry((user.to_string(), scoped.to_string()))
            .or_default()
            .extend(privs.iter().cloned());
        state.log.push(stmt);
    }

    fn apply_revoke(&self, user: &str, scoped: &str, privs: &PrivSet, stmt: String) {
        let mut state = self.state.lock().unwrap();
        if let Some(held) = state
            .privs
            .get_mut(&(user.to_string(), scoped.to_string()))
        {
            held.retain(|p| !privs.contains(p));
        }
        state.log.push(stmt);
    }

    fn priv_list(privs: &PrivSet) -> String {
        privs.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[async_trait]
impl DialectAdapter for MockAdapter {
    fn product(&self) -> ServerProduct {
        self.product
    }

    async fn server_version(&self) -> OperatorResult<ServerVersion> {
        Ok(ServerVersion::new(self.product, 15, 3, 0))
    }

    async fn execute(&self, sql: &str) -> OperatorResult<()> {
        self.state.lock().unwrap().log.push(sql.to_string());
        Ok(())
    }

    async fn user_exists(&self, name: &str) -> OperatorResult<bool> {
        Ok(self.state.lock().unwrap().users.contains(name))
    }

    async fn create_user(&self, name: &str, _password: Option<&str>) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.users.insert(name.to_string()) {
            return Err(OperatorError::already_exists(format!("role {name}")));
        }
        state.log.push(format!("CREATE ROLE {name}"));
        Ok(())
    }

    async fn drop_user(&self, name: &str) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.users.remove(name) {
            return Err(OperatorError::not_found(format!("role {name}")));
        }
        state.log.push(format!("DROP ROLE {name}"));
        Ok(())
    }

    async fn list_users(&self) -> OperatorResult<Vec<String>> {
        Ok(self.state.lock().unwrap().users.iter().cloned().collect())
    }

    async fn database_exists(&self, name: &str) -> OperatorResult<bool> {
        Ok(self.state.lock().unwrap().databases.contains(name))
    }

    async fn create_database(&self, name: &str, _owner: Option<&str>) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.databases.insert(name.to_string()) {
            return Err(OperatorError::already_exists(format!("database {name}")));
        }
        state.log.push(format!("CREATE DATABASE {name}"));
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.databases.remove(name) {
            return Err(OperatorError::not_found(format!("database {name}")));
        }
        state.log.push(format!("DROP DATABASE {name}"));
        Ok(())
    }

    async fn list_databases(&self) -> OperatorResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .databases
            .iter()
            .cloned()
            .collect())
    }

    async fn schema_exists(&self, name: &str) -> OperatorResult<bool> {
        Ok(self.state.lock().unwrap().schemas.contains(name))
    }

    async fn create_schema(&self, name: &str, _owner: Option<&str>) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.schemas.insert(name.to_string()) {
            return Err(OperatorError::already_exists(format!("schema {name}")));
        }
        state.log.push(format!("CREATE SCHEMA {name}"));
        Ok(())
    }

    async fn drop_schema(&self, name: &str) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.schemas.remove(name) {
            return Err(OperatorError::not_found(format!("schema {name}")));
        }
        state.log.push(format!("DROP SCHEMA {name}"));
        Ok(())
    }

    async fn list_schemas(&self) -> OperatorResult<Vec<String>> {
        Ok(self.state.lock().unwrap().schemas.iter().cloned().collect())
    }

    async fn role_attributes(&self, user: &str) -> OperatorResult<BTreeMap<String, bool>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .role_flags
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn alter_role_attributes(
        &self,
        user: &str,
        flags: &[RoleFlagState],
    ) -> OperatorResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.role_flags.entry(user.to_string()).or_default();
        let mut rendered = Vec::new();
        for flag in flags {
            entry.insert(flag.name.clone(), flag.value);
            rendered.push(if flag.value {
                flag.name.clone()
            } else {
                format!("NO{}", flag.name)
            });
        }
        state
            .log
            .push(format!("ALTER ROLE {user} WITH {}", rendered.join(" ")));
        Ok(())
    }

    async fn database_privileges(&self, user: &str, database: &str) -> OperatorResult<PrivSet> {
        Ok(self.privileges(user, &format!("database:{database}")))
    }

    async fn grant_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_grant(
            user,
            &format!("database:{database}"),
            privs,
            format!(
                "GRANT {} ON DATABASE {database} TO {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }

    async fn revoke_database(
        &self,
        user: &str,
        database: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_revoke(
            user,
            &format!("database:{database}"),
            privs,
            format!(
                "REVOKE {} ON DATABASE {database} FROM {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }

    async fn schema_privileges(&self, user: &str, schema: &str) -> OperatorResult<PrivSet> {
        Ok(self.privileges(user, &format!("schema:{schema}")))
    }

    async fn grant_schema(&self, user: &str, schema: &str, privs: &PrivSet) -> OperatorResult<()> {
        self.apply_grant(
            user,
            &format!("schema:{schema}"),
            privs,
            format!(
                "GRANT {} ON SCHEMA {schema} TO {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }

    async fn revoke_schema(
        &self,
        user: &str,
        schema: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_revoke(
            user,
            &format!("schema:{schema}"),
            privs,
            format!(
                "REVOKE {} ON SCHEMA {schema} FROM {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }

    async fn table_privileges(&self, user: &str, table: &TableRef) -> OperatorResult<PrivSet> {
        Ok(self.privileges(user, &format!("table:{table}")))
    }

    async fn grant_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_grant(
            user,
            &format!("table:{table}"),
            privs,
            format!("GRANT {} ON {table} TO {user}", Self::priv_list(privs)),
        );
        Ok(())
    }

    async fn revoke_table(
        &self,
        user: &str,
        table: &TableRef,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_revoke(
            user,
            &format!("table:{table}"),
            privs,
            format!("REVOKE {} ON {table} FROM {user}", Self::priv_list(privs)),
        );
        Ok(())
    }

    async fn default_table_privileges(
        &self,
        user: &str,
        grantor: &str,
    ) -> OperatorResult<PrivSet> {
        Ok(self.privileges(user, &format!("default:{grantor}")))
    }

    async fn grant_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_grant(
            user,
            &format!("default:{grantor}"),
            privs,
            format!(
                "ALTER DEFAULT PRIVILEGES FOR ROLE {grantor} GRANT {} ON TABLES TO {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }

    async fn revoke_default_tables(
        &self,
        user: &str,
        grantor: &str,
        privs: &PrivSet,
    ) -> OperatorResult<()> {
        self.apply_revoke(
            user,
            &format!("default:{grantor}"),
            privs,
            format!(
                "ALTER DEFAULT PRIVILEGES FOR ROLE {grantor} REVOKE {} ON TABLES FROM {user}",
                Self::priv_list(privs)
            ),
        );
        Ok(())
    }
}

/// Adapter source handing out one shared mock adapter for one known server.
pub struct FakeSource {
    pub adapter: Arc<MockAdapter>,
    pub server_ref: String,
    pub credentials: BTreeMap<String, Credential>,
    pub closed: AtomicUsize,
}

impl FakeSource {
    pub fn new(adapter: Arc<MockAdapter>, server_ref: &str) -> Self {
        Self {
            adapter,
            server_ref: server_ref.to_string(),
            credentials: BTreeMap::new(),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_credential(mut self, secret_ref: &str, credential: Credential) -> Self {
        self.credentials.insert(secret_ref.to_string(), credential);
        self
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self, server_ref: &str) -> OperatorResult<()> {
        if server_ref == self.server_ref {
            Ok(())
        } else {
            Err(OperatorError::not_found(format!("server {server_ref}")))
        }
    }
}

#[async_trait]
impl AdapterSource for FakeSource {
    async fn product(&self, server_ref: &str) -> OperatorResult<ServerProduct> {
        self.check(server_ref)?;
        Ok(self.adapter.product())
    }

    async fn adapter(
        &self,
        server_ref: &str,
        _database: Option<&str>,
    ) -> OperatorResult<Arc<dyn DialectAdapter>> {
        self.check(server_ref)?;
        Ok(self.adapter.clone())
    }

    async fn credential(&self, secret_ref: &str) -> OperatorResult<Credential> {
        self.credentials
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| OperatorError::not_found(format!("secret {secret_ref}")))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
