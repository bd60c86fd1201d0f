//! Scope classification and privilege-token normalization.
//!
//! A `DbPriv` entry's shape decides its scope: a colon in `privs` means
//! table scope, a dot in `scope` means schema scope, otherwise database
//! scope; a non-empty `defaultPrivs` means default-privileges-for-future-
//! tables. Tokens are canonicalized (upper-cased, `TEMP` folded to
//! `TEMPORARY`), `ALL` expands to the dialect's full vocabulary for the
//! scope, and anything outside the allow-list fails closed with the exact
//! offending tokens — before any SQL is issued.

use std::collections::BTreeSet;

use dbkeeper_core::resources::DbPriv;
use dbkeeper_core::{OperatorError, OperatorResult};
use dbkeeper_dialect::vocab::{canonical_token, valid_privileges, ScopeKind};
use dbkeeper_dialect::{PrivSet, ServerProduct, TableRef};

/// One classified privilege scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivScope {
    Database {
        database: String,
    },
    Schema {
        database: String,
        schema: String,
    },
    Table {
        database: String,
        table: TableRef,
    },
    DefaultTables {
        database: String,
        grantor: String,
    },
}

impl PrivScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            PrivScope::Database { .. } => ScopeKind::Database,
            PrivScope::Schema { .. } => ScopeKind::Schema,
            PrivScope::Table { .. } => ScopeKind::Table,
            PrivScope::DefaultTables { .. } => ScopeKind::DefaultTables,
        }
    }

    /// Database the scope lives in; the connection for this scope must be
    /// bound to it.
    pub fn database(&self) -> &str {
        match self {
            PrivScope::Database { database }
            | PrivScope::Schema { database, .. }
            | PrivScope::Table { database, .. }
            | PrivScope::DefaultTables { database, .. } => database,
        }
    }

    /// Human-readable scope name for logs and errors.
    pub fn scoped_name(&self) -> String {
        match self {
            PrivScope::Database { database } => database.clone(),
            PrivScope::Schema { database, schema } => format!("{database}.{schema}"),
            PrivScope::Table { database, table } => format!("{database}:{table}"),
            PrivScope::DefaultTables { database, grantor } => {
                format!("{database} (default for {grantor})")
            }
        }
    }
}

/// Classify one `DbPriv` entry and pull out its raw token list.
pub fn classify(entry: &DbPriv) -> OperatorResult<(PrivScope, Vec<String>)> {
    entry.validate()?;

    if !entry.default_privs.is_empty() {
        if entry.grantor.is_empty() {
            return Err(OperatorError::invalid_spec(format!(
                "scope '{}': defaultPrivs requires a grantor",
                entry.scope
            )));
        }
        let scope = PrivScope::DefaultTables {
            database: entry.scope.clone(),
            grantor: entry.grantor.clone(),
        };
        return Ok((scope, split_tokens(&entry.default_privs)));
    }

    if let Some((table, privs)) = entry.privs.split_once(':') {
        let (database, schema) = match entry.scope.split_once('.') {
            Some((db, schema)) => (db.to_string(), Some(schema.to_string())),
            None => (entry.scope.clone(), None),
        };
        let scope = PrivScope::Table {
            database,
            table: TableRef::new(schema, table.trim()),
        };
        return Ok((scope, split_tokens(privs)));
    }

    if let Some((database, schema)) = entry.scope.split_once('.') {
        let scope = PrivScope::Schema {
            database: database.to_string(),
            schema: schema.to_string(),
        };
        return Ok((scope, split_tokens(&entry.privs)));
    }

    let scope = PrivScope::Database {
        database: entry.scope.clone(),
    };
    Ok((scope, split_tokens(&entry.privs)))
}

fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize raw tokens into the canonical deduplicated set for a scope.
pub fn normalize(
    product: ServerProduct,
    kind: ScopeKind,
    raw: &[String],
) -> OperatorResult<PrivSet> {
    let valid = valid_privileges(product, kind).ok_or_else(|| {
        OperatorError::unsupported(product.as_str(), format!("{} privileges", kind.as_str()))
    })?;

    let mut normalized: PrivSet = BTreeSet::new();
    let mut invalid = Vec::new();

    for token in raw {
        let canonical = canonical_token(product, token);
        if canonical == "ALL" {
            normalized.extend(valid.iter().map(|p| p.to_string()));
        } else if valid.contains(&canonical.as_str()) {
            normalized.insert(canonical);
        } else {
            invalid.push(canonical);
        }
    }

    if !invalid.is_empty() {
        return Err(OperatorError::invalid_spec(format!(
            "invalid privileges for {} scope on {}: {}",
            kind.as_str(),
            product,
            invalid.join(", ")
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scope: &str, privs: &str) -> DbPriv {
        DbPriv {
            scope: scope.into(),
            privs: privs.into(),
            default_privs: String::new(),
            grantor: String::new(),
        }
    }

    fn set(tokens: &[&str]) -> PrivSet {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn colon_in_privs_means_table_scope() {
        let (scope, raw) = classify(&entry("appdb.reporting", "orders:SELECT,INSERT")).unwrap();
        assert_eq!(scope.kind(), ScopeKind::Table);
        assert_eq!(scope.database(), "appdb");
        assert_eq!(raw, vec!["SELECT", "INSERT"]);
        if let PrivScope::Table { table, .. } = scope {
            assert_eq!(table.schema.as_deref(), Some("reporting"));
            assert_eq!(table.table, "orders");
        } else {
            panic!("expected table scope");
        }
    }

    #[test]
    fn dot_in_scope_means_schema_scope() {
        let (scope, raw) = classify(&entry("appdb.reporting", "USAGE")).unwrap();
        assert_eq!(scope.kind(), ScopeKind::Schema);
        assert_eq!(scope.scoped_name(), "appdb.reporting");
        assert_eq!(raw, vec!["USAGE"]);
    }

    #[test]
    fn bare_scope_means_database_scope() {
        let (scope, _) = classify(&entry("appdb", "CONNECT")).unwrap();
        assert_eq!(scope.kind(), ScopeKind::Database);
    }

    #[test]
    fn default_privs_mean_default_tables_scope() {
        let e = DbPriv {
            scope: "appdb".into(),
            privs: String::new(),
            default_privs: "SELECT".into(),
            grantor: "owner".into(),
        };
        let (scope, raw) = classify(&e).unwrap();
        assert_eq!(scope.kind(), ScopeKind::DefaultTables);
        assert_eq!(raw, vec!["SELECT"]);
    }

    #[test]
    fn default_privs_without_grantor_are_rejected() {
        let e = DbPriv {
            scope: "appdb".into(),
            privs: String::new(),
            default_privs: "SELECT".into(),
            grantor: String::new(),
        };
        assert!(classify(&e).unwrap_err().is_invalid_spec());
    }

    #[test]
    fn all_expands_to_database_vocabulary() {
        let got = normalize(
            ServerProduct::Postgres,
            ScopeKind::Database,
            &["ALL".to_string()],
        )
        .unwrap();
        assert_eq!(got, set(&["CREATE", "CONNECT", "TEMPORARY"]));
    }

    #[test]
    fn all_expands_to_full_table_vocabulary() {
        let got = normalize(
            ServerProduct::Postgres,
            ScopeKind::Table,
            &["all".to_string()],
        )
        .unwrap();
        assert_eq!(got.len(), 7);
    }

    #[test]
    fn temp_folds_to_temporary_never_both() {
        let got = normalize(
            ServerProduct::Postgres,
            ScopeKind::Database,
            &["TEMP".to_string(), "TEMPORARY".to_string()],
        )
        .unwrap();
        assert_eq!(got, set(&["TEMPORARY"]));
    }

    #[test]
    fn invalid_tokens_are_enumerated_exactly() {
        let err = normalize(
            ServerProduct::Postgres,
            ScopeKind::Database,
            &["CONNECT".to_string(), "FLY".to_string(), "SWIM".to_string()],
        )
        .unwrap_err();
        assert!(err.is_invalid_spec());
        let text = err.to_string();
        assert!(text.contains("FLY"));
        assert!(text.contains("SWIM"));
        assert!(!text.contains("CONNECT,"));
    }

    #[test]
    fn unsupported_scope_fails_for_mysql() {
        let err = normalize(
            ServerProduct::MySql,
            ScopeKind::DefaultTables,
            &["SELECT".to_string()],
        )
        .unwrap_err();
        assert!(err.is_invalid_spec());
    }
}
