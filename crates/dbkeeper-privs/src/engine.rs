//! The privilege convergence engine.
//!
//! Diffs a declared privilege set against what the principal actually holds
//! and issues the minimal grant/revoke statements to close the gap. The diff
//! is dialect-agnostic; every dialect-specific behavior stays inside the
//! adapter's getter/grant/revoke triples.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use dbkeeper_core::resources::DbPriv;
use dbkeeper_core::OperatorResult;
use dbkeeper_dialect::{DialectAdapter, PrivSet};

use crate::flags::parse_role_flags;
use crate::normalize::{classify, normalize, PrivScope};

/// Hands out dialect adapters bound to a database.
///
/// Implemented by the connection provider: each distinct database resolves
/// to one cached handle for the duration of the reconciliation pass.
#[async_trait]
pub trait AdapterProvider: Send + Sync {
    /// Adapter bound to `database`, or to the server's maintenance database
    /// when `None` (role-level statements).
    async fn adapter(&self, database: Option<&str>) -> OperatorResult<Arc<dyn DialectAdapter>>;
}

/// Ephemeral per-scope diff unit. Built fresh for one scope, used once,
/// discarded; carries no state across invocations.
#[derive(Debug)]
pub struct PrivsReconciler {
    pub user: String,
    pub scoped_name: String,
    pub desired: PrivSet,
    pub found: PrivSet,
}

impl PrivsReconciler {
    pub fn new(
        user: impl Into<String>,
        scoped_name: impl Into<String>,
        desired: PrivSet,
        found: PrivSet,
    ) -> Self {
        Self {
            user: user.into(),
            scoped_name: scoped_name.into(),
            desired,
            found,
        }
    }

    /// `live − desired`: held but no longer declared.
    pub fn to_revoke(&self) -> PrivSet {
        self.found.difference(&self.desired).cloned().collect()
    }

    /// `desired − live`: declared but not yet held.
    pub fn to_grant(&self) -> PrivSet {
        self.desired.difference(&self.found).cloned().collect()
    }
}

/// Converge a user's privileges toward the declared specification.
///
/// Returns whether any statement was issued. Idempotent: a second call with
/// the same spec issues nothing and returns `false`. A statement failure
/// aborts the current scope and propagates verbatim; earlier scopes are not
/// rolled back — the next reconciliation re-diffs and resumes.
#[instrument(skip(provider, specs, server_priv_flags), fields(user = %user))]
pub async fn update_user_privs(
    provider: &dyn AdapterProvider,
    user: &str,
    server_priv_flags: &str,
    specs: &[DbPriv],
) -> OperatorResult<bool> {
    let mut changed = false;

    // Server-level role attributes first. One ALTER carrying all parsed
    // flags when any of them differs from the live value; unmentioned
    // attributes are left as-is.
    if !server_priv_flags.trim().is_empty() {
        let adapter = provider.adapter(None).await?;
        let version = adapter.server_version().await?;
        let flags = parse_role_flags(server_priv_flags, &version)?;
        let live = adapter.role_attributes(user).await?;
        let differs = flags
            .iter()
            .any(|f| live.get(&f.name).copied().unwrap_or(false) != f.value);
        if differs {
            adapter.alter_role_attributes(user, &flags).await?;
            changed = true;
        }
    }

    for spec in specs {
        let (scope, raw_tokens) = classify(spec)?;
        let adapter = provider.adapter(Some(scope.database())).await?;
        let desired = normalize(adapter.product(), scope.kind(), &raw_tokens)?;
        let found = fetch_live(adapter.as_ref(), user, &scope).await?;

        let rec = PrivsReconciler::new(user, scope.scoped_name(), desired, found);
        let to_revoke = rec.to_revoke();
        if !to_revoke.is_empty() {
            debug!(scope = %rec.scoped_name, revoke = ?to_revoke, "revoking privileges");
            apply_revoke(adapter.as_ref(), user, &scope, &to_revoke).await?;
            changed = true;
        }
        let to_grant = rec.to_grant();
        if !to_grant.is_empty() {
            debug!(scope = %rec.scoped_name, grant = ?to_grant, "granting privileges");
            apply_grant(adapter.as_ref(), user, &scope, &to_grant).await?;
            changed = true;
        }
    }

    Ok(changed)
}

async fn fetch_live(
    adapter: &dyn DialectAdapter,
    user: &str,
    scope: &PrivScope,
) -> OperatorResult<PrivSet> {
    match scope {
        PrivScope::Database { database } => adapter.database_privileges(user, database).await,
        PrivScope::Schema { schema, .. } => adapter.schema_privileges(user, schema).await,
        PrivScope::Table { table, .. } => adapter.table_privileges(user, table).await,
        PrivScope::DefaultTables { grantor, .. } => {
            adapter.default_table_privileges(user, grantor).await
        }
    }
}

async fn apply_grant(
    adapter: &dyn DialectAdapter,
    user: &str,
    scope: &PrivScope,
    privs: &PrivSet,
) -> OperatorResult<()> {
    match scope {
        PrivScope::Database { database } => adapter.grant_database(user, database, privs).await,
        PrivScope::Schema { schema, .. } => adapter.grant_schema(user, schema, privs).await,
        PrivScope::Table { table, .. } => adapter.grant_table(user, table, privs).await,
        PrivScope::DefaultTables { grantor, .. } => {
            adapter.grant_default_tables(user, grantor, privs).await
        }
    }
}

async fn apply_revoke(
    adapter: &dyn DialectAdapter,
    user: &str,
    scope: &PrivScope,
    privs: &PrivSet,
) -> OperatorResult<()> {
    match scope {
        PrivScope::Database { database } => adapter.revoke_database(user, database, privs).await,
        PrivScope::Schema { schema, .. } => adapter.revoke_schema(user, schema, privs).await,
        PrivScope::Table { table, .. } => adapter.revoke_table(user, table, privs).await,
        PrivScope::DefaultTables { grantor, .. } => {
            adapter.revoke_default_tables(user, grantor, privs).await
        }
    }
}
