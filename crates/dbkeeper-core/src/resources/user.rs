//! User resource: a login role plus its declared privileges.

use serde::{Deserialize, Serialize};

use super::{Phase, Resource};
use crate::error::{OperatorError, OperatorResult};
use crate::meta::{ResourceKind, ResourceMeta};

/// One privilege declaration for one scope.
///
/// `scope` identifies a database (`appdb`), or `database.schema` for schema
/// and table scoping. `privs` is a comma list of privilege tokens; for table
/// scope the single token is colon-qualified (`orders:SELECT,INSERT`).
/// `default_privs` instead configures privileges auto-granted on future
/// tables created by `grantor`. Exactly one of `privs`/`default_privs` may
/// be set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPriv {
    pub scope: String,
    #[serde(default)]
    pub privs: String,
    #[serde(default)]
    pub default_privs: String,
    #[serde(default)]
    pub grantor: String,
}

impl DbPriv {
    /// Structural validation shared by every dialect: exactly one of
    /// `privs`/`default_privs`, and no deprecated slash-packed scopes.
    pub fn validate(&self) -> OperatorResult<()> {
        if self.scope.contains('/') {
            return Err(OperatorError::invalid_spec(format!(
                "scope '{}' contains '/': one spec entry per scope is required",
                self.scope
            )));
        }
        match (self.privs.is_empty(), self.default_privs.is_empty()) {
            (false, false) => Err(OperatorError::invalid_spec(format!(
                "scope '{}' sets both privs and defaultPrivs",
                self.scope
            ))),
            (true, true) => Err(OperatorError::invalid_spec(format!(
                "scope '{}' sets neither privs nor defaultPrivs",
                self.scope
            ))),
            _ => Ok(()),
        }
    }
}

/// Desired state of a database user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    /// Name of the server resource the role lives on.
    pub server_ref: String,
    /// Role name. Defaults to the resource name.
    #[serde(default)]
    pub username: Option<String>,
    /// Secret holding the role password.
    pub secret_ref: String,
    /// Comma list of server-level role attributes, optionally NO-prefixed
    /// (e.g. `CREATEDB,NOLOGIN`). Attributes not mentioned are left as-is.
    #[serde(default)]
    pub server_privs: String,
    /// Per-scope privilege declarations.
    #[serde(default)]
    pub privileges: Vec<DbPriv>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResource {
    pub meta: ResourceMeta,
    pub spec: UserSpec,
    #[serde(default)]
    pub status: UserStatus,
}

impl UserResource {
    pub fn new(meta: ResourceMeta, spec: UserSpec) -> Self {
        Self {
            meta,
            spec,
            status: UserStatus::default(),
        }
    }

    /// Effective role name: the spec override or the resource name.
    pub fn username(&self) -> &str {
        self.spec.username.as_deref().unwrap_or(&self.meta.name)
    }
}

impl Resource for UserResource {
    const KIND: ResourceKind = ResourceKind::User;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}
