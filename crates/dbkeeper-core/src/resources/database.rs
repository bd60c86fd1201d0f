//! Database resource: one live database on a referenced server.

use serde::{Deserialize, Serialize};

use super::{Phase, Resource};
use crate::meta::{ResourceKind, ResourceMeta};

/// Desired state of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Name of the server resource this database lives on.
    pub server_ref: String,
    /// Database name on the server. Defaults to the resource name.
    #[serde(default)]
    pub database: Option<String>,
    /// Role that owns the database once created.
    #[serde(default)]
    pub owner: Option<String>,
    /// Drop the live database when the resource is deleted. When false,
    /// deletion only detaches the resource and leaves the database behind.
    #[serde(default)]
    pub drop_on_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseResource {
    pub meta: ResourceMeta,
    pub spec: DatabaseSpec,
    #[serde(default)]
    pub status: DatabaseStatus,
}

impl DatabaseResource {
    pub fn new(meta: ResourceMeta, spec: DatabaseSpec) -> Self {
        Self {
            meta,
            spec,
            status: DatabaseStatus::default(),
        }
    }

    /// Effective database name: the spec override or the resource name.
    pub fn database_name(&self) -> &str {
        self.spec.database.as_deref().unwrap_or(&self.meta.name)
    }
}

impl Resource for DatabaseResource {
    const KIND: ResourceKind = ResourceKind::Database;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}
