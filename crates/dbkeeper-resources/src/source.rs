//! Per-pass access to dialect adapters.
//!
//! Strategies never touch connection handles; they ask this capability for
//! an adapter bound to (server, database) and let it own the underlying
//! handle cache for the pass. The production implementation wraps the
//! connection provider; tests substitute scripted adapters.

use async_trait::async_trait;
use std::sync::Arc;

use dbkeeper_conn::{ConnectionProvider, Credential};
use dbkeeper_core::OperatorResult;
use dbkeeper_dialect::{adapter_for, DialectAdapter, ServerProduct};

/// Hands out adapters and credentials for the duration of one pass.
#[async_trait]
pub trait AdapterSource: Send + Sync {
    /// Backend product of the referenced server.
    async fn product(&self, server_ref: &str) -> OperatorResult<ServerProduct>;

    /// Adapter bound to `database` on the referenced server, or to the
    /// server's maintenance database when `None`.
    async fn adapter(
        &self,
        server_ref: &str,
        database: Option<&str>,
    ) -> OperatorResult<Arc<dyn DialectAdapter>>;

    /// Resolve a secret reference to a credential.
    async fn credential(&self, secret_ref: &str) -> OperatorResult<Credential>;

    /// Release every handle opened during this pass.
    async fn close(&self);
}

/// Production source backed by the connection provider.
pub struct ConnAdapterSource {
    conn: Arc<ConnectionProvider>,
}

impl ConnAdapterSource {
    pub fn new(conn: Arc<ConnectionProvider>) -> Self {
        Self { conn }
    }

    pub(crate) fn provider(&self) -> &ConnectionProvider {
        &self.conn
    }
}

#[async_trait]
impl AdapterSource for ConnAdapterSource {
    async fn product(&self, server_ref: &str) -> OperatorResult<ServerProduct> {
        self.conn.product(server_ref).await
    }

    async fn adapter(
        &self,
        server_ref: &str,
        database: Option<&str>,
    ) -> OperatorResult<Arc<dyn DialectAdapter>> {
        let server = self.conn.server(server_ref).await?;
        let runner = self.conn.get_connection(server_ref, database, None).await?;
        let bound = database.unwrap_or(&server.default_database);
        Ok(adapter_for(server.product, runner, bound))
    }

    async fn credential(&self, secret_ref: &str) -> OperatorResult<Credential> {
        self.conn.credential(secret_ref).await
    }

    async fn close(&self) {
        self.conn.close().await;
    }
}
