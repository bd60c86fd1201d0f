//! Privilege vocabularies and role-attribute sets, per dialect.
//!
//! These allow-lists are the only place privilege tokens are declared valid;
//! everything the convergence engine accepts, expands or interpolates is
//! checked against them first.

use crate::version::{ServerProduct, ServerVersion};

/// The object class a privilege applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Database,
    Schema,
    Table,
    /// Privileges auto-granted on future tables created by a grantor.
    DefaultTables,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Database => "database",
            ScopeKind::Schema => "schema",
            ScopeKind::Table => "table",
            ScopeKind::DefaultTables => "default table",
        }
    }
}

const PG_DATABASE: &[&str] = &["CREATE", "CONNECT", "TEMPORARY"];
const PG_SCHEMA: &[&str] = &["CREATE", "USAGE"];
const PG_TABLE: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "TRUNCATE",
    "REFERENCES",
    "TRIGGER",
];

const CRDB_DATABASE: &[&str] = &["BACKUP", "CONNECT", "CREATE", "DROP", "RESTORE", "ZONECONFIG"];
const CRDB_SCHEMA: &[&str] = &["CREATE", "USAGE"];
const CRDB_TABLE: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "BACKUP",
    "ZONECONFIG",
];
const CRDB_DEFAULT_TABLES: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE"];

const MYSQL_DATABASE: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "CREATE",
    "DROP",
    "ALTER",
    "INDEX",
    "REFERENCES",
    "EXECUTE",
];
const MYSQL_TABLE: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "REFERENCES",
    "INDEX",
    "TRIGGER",
];

/// Valid privilege tokens for one (product, scope) pair, or `None` when the
/// dialect has no such scope (mysql has neither schemas nor default ACLs).
pub fn valid_privileges(product: ServerProduct, scope: ScopeKind) -> Option<&'static [&'static str]> {
    match (product, scope) {
        (ServerProduct::Postgres, ScopeKind::Database) => Some(PG_DATABASE),
        (ServerProduct::Postgres, ScopeKind::Schema) => Some(PG_SCHEMA),
        (ServerProduct::Postgres, ScopeKind::Table | ScopeKind::DefaultTables) => Some(PG_TABLE),
        (ServerProduct::Cockroach, ScopeKind::Database) => Some(CRDB_DATABASE),
        (ServerProduct::Cockroach, ScopeKind::Schema) => Some(CRDB_SCHEMA),
        (ServerProduct::Cockroach, ScopeKind::Table) => Some(CRDB_TABLE),
        (ServerProduct::Cockroach, ScopeKind::DefaultTables) => Some(CRDB_DEFAULT_TABLES),
        (ServerProduct::MySql, ScopeKind::Database) => Some(MYSQL_DATABASE),
        (ServerProduct::MySql, ScopeKind::Table) => Some(MYSQL_TABLE),
        (ServerProduct::MySql, ScopeKind::Schema | ScopeKind::DefaultTables) => None,
    }
}

/// Fold deprecated synonyms into canonical form.
pub fn canonical_token(product: ServerProduct, token: &str) -> String {
    let upper = token.trim().to_ascii_uppercase();
    match product {
        ServerProduct::Postgres | ServerProduct::Cockroach if upper == "TEMP" => {
            "TEMPORARY".to_string()
        }
        _ => upper,
    }
}

const PG_FLAGS_BASE: &[&str] = &["SUPERUSER", "CREATEDB", "CREATEROLE", "LOGIN", "INHERIT"];
const CRDB_FLAGS: &[&str] = &["CREATEDB", "CREATEROLE", "LOGIN"];

/// Server-level role attributes valid for the probed version.
///
/// REPLICATION appeared in postgres 9.1, BYPASSRLS in 9.5. MySQL has no
/// role-attribute concept; the empty set makes every requested flag invalid.
pub fn valid_role_flags(version: &ServerVersion) -> Vec<&'static str> {
    match version.product {
        ServerProduct::Postgres => {
            let mut flags = PG_FLAGS_BASE.to_vec();
            if version.at_least(9, 1) {
                flags.push("REPLICATION");
            }
            if version.at_least(9, 5) {
                flags.push("BYPASSRLS");
            }
            flags
        }
        ServerProduct::Cockroach => CRDB_FLAGS.to_vec(),
        ServerProduct::MySql => Vec::new(),
    }
}
