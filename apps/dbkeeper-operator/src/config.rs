//! Operator configuration loaded from environment variables.
//!
//! Fail-fast: required variables must be present and valid or the process
//! exits with a clear error before any reconciliation starts.

use std::env;
use thiserror::Error;

use dbkeeper_dialect::ServerProduct;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Connection details for the managed server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Logical name resources reference via `serverRef`.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub product: ServerProduct,
    pub default_database: String,
    pub admin_user: String,
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Log filter directive (e.g. "info,dbkeeper=debug").
    pub rust_log: String,
    /// Namespace whose resources this operator instance reconciles.
    pub namespace: String,
    /// Full-resync interval in seconds.
    pub resync_secs: u64,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let namespace = env::var("DBK_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let resync_secs = optional_parsed("DBK_RESYNC_SECS", 60)?;

        let product_raw = required("DBK_SERVER_PRODUCT")?;
        let product = match product_raw.to_lowercase().as_str() {
            "postgres" => ServerProduct::Postgres,
            "cockroach" => ServerProduct::Cockroach,
            "mysql" => ServerProduct::MySql,
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "DBK_SERVER_PRODUCT".to_string(),
                    message: format!("unknown product '{other}'"),
                })
            }
        };

        let default_database = env::var("DBK_SERVER_DEFAULT_DB").unwrap_or_else(|_| {
            match product {
                ServerProduct::Postgres => "postgres",
                ServerProduct::Cockroach => "defaultdb",
                ServerProduct::MySql => "mysql",
            }
            .to_string()
        });

        Ok(Self {
            rust_log,
            namespace,
            resync_secs,
            server: ServerConfig {
                name: required("DBK_SERVER_NAME")?,
                host: required("DBK_SERVER_HOST")?,
                port: optional_parsed("DBK_SERVER_PORT", default_port(product))?,
                product,
                default_database,
                admin_user: required("DBK_SERVER_ADMIN_USER")?,
                admin_password: required("DBK_SERVER_ADMIN_PASSWORD")?,
            },
        })
    }
}

fn default_port(product: ServerProduct) -> u16 {
    match product {
        ServerProduct::Postgres => 5432,
        ServerProduct::Cockroach => 26257,
        ServerProduct::MySql => 3306,
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
}

fn optional_parsed<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("cannot parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}
