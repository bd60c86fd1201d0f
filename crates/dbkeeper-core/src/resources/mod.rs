//! Declared-state resource records.
//!
//! One spec/status pair per managed kind. Specs are immutable intent owned
//! by whoever created the record; statuses are written back by the operator
//! after every reconciliation. Privilege-bearing kinds persist no privilege
//! detail in status — privileges are always re-derived live.

mod backup;
mod database;
mod schema;
mod user;

pub use backup::{
    BackupJob, BackupJobSpec, BackupScheduleResource, BackupScheduleSpec, BackupScheduleStatus,
    JobSpec, JobStatus, RestoreJob,
};
pub use database::{DatabaseResource, DatabaseSpec, DatabaseStatus};
pub use schema::{SchemaResource, SchemaSpec, SchemaStatus};
pub use user::{DbPriv, UserResource, UserSpec, UserStatus};

use serde::{Deserialize, Serialize};

use crate::meta::{ResourceKey, ResourceKind, ResourceMeta};

/// Capability implemented by every managed resource record.
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn meta(&self) -> &ResourceMeta;
    fn meta_mut(&mut self) -> &mut ResourceMeta;

    fn key(&self) -> ResourceKey {
        ResourceKey::new(Self::KIND, &self.meta().namespace, &self.meta().name)
    }
}

/// Last-observed reconciliation outcome, common to all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    #[default]
    Pending,
    Creating,
    Ready,
    Failed,
    Terminating,
}
