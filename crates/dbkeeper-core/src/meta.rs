//! Resource identity and lifecycle metadata.
//!
//! Every managed resource carries a [`ResourceMeta`]: its (namespace, name)
//! identity, creation/deletion timestamps and the finalizer list the
//! reconciler uses to gate teardown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// The finalizer token dbkeeper places on resources it has materialized.
///
/// Present iff the operator has successfully created the corresponding live
/// object and that object has not yet been torn down.
pub const FINALIZER: &str = "dbkeeper.dev/cleanup";

/// Resource kinds managed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResourceKind {
    Database,
    User,
    Schema,
    BackupSchedule,
    BackupJob,
    RestoreJob,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Database => "Database",
            ResourceKind::User => "User",
            ResourceKind::Schema => "Schema",
            ResourceKind::BackupSchedule => "BackupSchedule",
            ResourceKind::BackupJob => "BackupJob",
            ResourceKind::RestoreJob => "RestoreJob",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique key of one resource instance: (kind, namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Lifecycle metadata shared by all managed resource kinds.
///
/// The store owns the record; the operator only writes status, finalizers
/// and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub namespace: String,
    pub name: String,
    pub uid: Uuid,
    /// Incremented by the store on every spec change.
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    /// Non-nil once deletion has been requested; the store keeps the record
    /// alive while finalizers remain.
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: Uuid::new_v4(),
            generation: 1,
            created_at: Utc::now(),
            deleted_at: None,
            finalizers: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    /// True once deletion has been requested, regardless of finalizers.
    pub fn marked_for_deletion(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers.iter().any(|f| f == FINALIZER)
    }

    /// Add the dbkeeper finalizer. Idempotent; returns true if it was added.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers.push(FINALIZER.to_string());
        true
    }

    /// Remove the dbkeeper finalizer. Returns true if it was present.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != FINALIZER);
        self.finalizers.len() != before
    }

    /// Wall-clock age of the resource, from creation or deletion request,
    /// whichever is later. Drives restart-safe backoff.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        let anchor = self.deleted_at.unwrap_or(self.created_at);
        now.signed_duration_since(anchor)
    }
}
