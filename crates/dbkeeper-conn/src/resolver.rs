//! Server and credential resolution capabilities.
//!
//! The operator never stores addresses or passwords itself; a resolver
//! turns a server reference into connection details and a secret reference
//! into a credential. Resolution results are memoized per reconciliation
//! pass by the connection provider, never across passes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dbkeeper_core::OperatorResult;
use dbkeeper_dialect::ServerProduct;

/// Connection details for one database server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub product: ServerProduct,
    /// Maintenance database used when no database is requested
    /// (`postgres`, `defaultdb`, `mysql`).
    pub default_database: String,
    /// Admin credential the operator acts as by default.
    pub admin: Credential,
}

/// A resolved (username, password) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Resolves logical references to live connection details.
///
/// Failures to resolve must surface as `OperatorError::NotFound` so the
/// reconciler can classify them (retry, or resolved-by-deletion during
/// teardown).
#[async_trait]
pub trait ServerResolver: Send + Sync {
    async fn resolve_server(&self, server_ref: &str) -> OperatorResult<ServerInfo>;

    async fn resolve_credential(&self, secret_ref: &str) -> OperatorResult<Credential>;
}
