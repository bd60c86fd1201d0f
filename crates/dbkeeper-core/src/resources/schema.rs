//! Schema resource: one named schema inside a managed database.

use serde::{Deserialize, Serialize};

use super::{Phase, Resource};
use crate::meta::{ResourceKind, ResourceMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    /// Name of the server resource.
    pub server_ref: String,
    /// Database the schema lives in.
    pub database: String,
    /// Schema name. Defaults to the resource name.
    #[serde(default)]
    pub schema: Option<String>,
    /// Role that owns the schema once created.
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResource {
    pub meta: ResourceMeta,
    pub spec: SchemaSpec,
    #[serde(default)]
    pub status: SchemaStatus,
}

impl SchemaResource {
    pub fn new(meta: ResourceMeta, spec: SchemaSpec) -> Self {
        Self {
            meta,
            spec,
            status: SchemaStatus::default(),
        }
    }

    pub fn schema_name(&self) -> &str {
        self.spec.schema.as_deref().unwrap_or(&self.meta.name)
    }
}

impl Resource for SchemaResource {
    const KIND: ResourceKind = ResourceKind::Schema;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}
