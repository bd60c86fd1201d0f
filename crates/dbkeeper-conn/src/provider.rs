//! The per-pass connection provider.
//!
//! One provider instance lives for exactly one reconciliation pass. Handles
//! are opened lazily on first use, cached per (server, database, acting
//! user) key,
//! handed out as opaque runners, and all released by `close()` — which the
//! reconciler guarantees to call on every exit path. Nothing is shared
//! across passes: a concurrent pass for another resource instance owns its
//! own provider, handles and version probes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use dbkeeper_core::OperatorResult;
use dbkeeper_dialect::{ServerProduct, SqlRunner};

use crate::pool::{Handle, PoolFactory};
use crate::resolver::{Credential, ServerInfo, ServerResolver};

pub struct ConnectionProvider {
    resolver: Arc<dyn ServerResolver>,
    factory: Arc<dyn PoolFactory>,
    /// Per-pass memo of resolved servers, keyed by server reference.
    servers: Mutex<HashMap<String, ServerInfo>>,
    /// One handle per (server, database, acting user).
    handles: Mutex<HashMap<(String, String, String), Handle>>,
}

impl ConnectionProvider {
    pub fn new(resolver: Arc<dyn ServerResolver>, factory: Arc<dyn PoolFactory>) -> Self {
        Self {
            resolver,
            factory,
            servers: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a server reference, memoized for this pass.
    pub async fn server(&self, server_ref: &str) -> OperatorResult<ServerInfo> {
        let mut servers = self.servers.lock().await;
        if let Some(info) = servers.get(server_ref) {
            return Ok(info.clone());
        }
        let info = self.resolver.resolve_server(server_ref).await?;
        servers.insert(server_ref.to_string(), info.clone());
        Ok(info)
    }

    /// Backend product of the referenced server.
    pub async fn product(&self, server_ref: &str) -> OperatorResult<ServerProduct> {
        Ok(self.server(server_ref).await?.product)
    }

    /// Resolve a secret reference to a credential (not memoized; secrets
    /// are fetched at most once per pass by their single call site).
    pub async fn credential(&self, secret_ref: &str) -> OperatorResult<Credential> {
        self.resolver.resolve_credential(secret_ref).await
    }

    /// Get a runner for (server, database, acting user). `None` database
    /// means the server's maintenance database; `None` user means the
    /// admin credential.
    pub async fn get_connection(
        &self,
        server_ref: &str,
        database: Option<&str>,
        as_user: Option<&Credential>,
    ) -> OperatorResult<Arc<dyn SqlRunner>> {
        let server = self.server(server_ref).await?;
        let database = database.unwrap_or(&server.default_database).to_string();
        let credential = as_user.cloned().unwrap_or_else(|| server.admin.clone());

        let key = (
            server_ref.to_string(),
            database.clone(),
            credential.username.clone(),
        );
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&key) {
            return Ok(handle.runner());
        }

        let handle = self.factory.open(&server, &database, &credential).await?;
        let runner = handle.runner();
        handles.insert(key, handle);
        Ok(runner)
    }

    /// Release every handle opened during this pass.
    pub async fn close(&self) {
        let mut handles = self.handles.lock().await;
        let count = handles.len();
        for (_, handle) in handles.drain() {
            handle.close().await;
        }
        if count > 0 {
            debug!(handles = count, "released connection handles");
        }
    }
}
