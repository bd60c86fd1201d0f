//! Environment-backed server and secret resolution.
//!
//! The operator is configured with one managed server; secrets resolve
//! from `DBK_SECRET_<REF>` variables holding `user:password`. Anything
//! unknown is NotFound so the reconciler can classify it.

use async_trait::async_trait;
use std::env;

use dbkeeper_conn::{Credential, ServerInfo, ServerResolver};
use dbkeeper_core::{OperatorError, OperatorResult};

use crate::config::ServerConfig;

pub struct EnvResolver {
    server: ServerConfig,
}

impl EnvResolver {
    pub fn new(server: ServerConfig) -> Self {
        Self { server }
    }
}

#[async_trait]
impl ServerResolver for EnvResolver {
    async fn resolve_server(&self, server_ref: &str) -> OperatorResult<ServerInfo> {
        if server_ref != self.server.name {
            return Err(OperatorError::not_found(format!("server {server_ref}")));
        }
        Ok(ServerInfo {
            host: self.server.host.clone(),
            port: self.server.port,
            product: self.server.product,
            default_database: self.server.default_database.clone(),
            admin: Credential::new(&self.server.admin_user, &self.server.admin_password),
        })
    }

    async fn resolve_credential(&self, secret_ref: &str) -> OperatorResult<Credential> {
        let var = secret_var(secret_ref);
        let raw = env::var(&var)
            .map_err(|_| OperatorError::not_found(format!("secret {secret_ref}")))?;
        parse_credential(secret_ref, &raw)
    }
}

fn secret_var(secret_ref: &str) -> String {
    format!(
        "DBK_SECRET_{}",
        secret_ref.to_uppercase().replace(['-', '.'], "_")
    )
}

fn parse_credential(secret_ref: &str, raw: &str) -> OperatorResult<Credential> {
    let (user, password) = raw.split_once(':').ok_or_else(|| {
        OperatorError::internal(format!(
            "secret {secret_ref} is not in user:password form"
        ))
    })?;
    Ok(Credential::new(user, password))
}
