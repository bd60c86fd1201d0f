//! Backup and restore resources: recurring schedules and one-shot jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Phase, Resource};
use crate::meta::{ResourceKind, ResourceMeta};

/// Desired state of a recurring backup schedule (distributed dialect only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleSpec {
    /// Name of the server resource.
    pub server_ref: String,
    /// Database to back up.
    pub database: String,
    /// Backup target (bucket/path) resource the statement points at.
    pub target_ref: String,
    /// Cron expression for recurrence.
    pub recurrence: String,
    /// Pause the schedule without dropping it.
    #[serde(default)]
    pub suspend: bool,
}

/// Observed schedule state, mirrored from the backend's schedule catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
    /// Backend-assigned schedule id. Stable across suspend/resume; changes
    /// when the backup statement changes and the schedule is recreated.
    #[serde(default)]
    pub schedule_id: Option<i64>,
    #[serde(default)]
    pub schedule_status: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupScheduleResource {
    pub meta: ResourceMeta,
    pub spec: BackupScheduleSpec,
    #[serde(default)]
    pub status: BackupScheduleStatus,
}

impl BackupScheduleResource {
    pub fn new(meta: ResourceMeta, spec: BackupScheduleSpec) -> Self {
        Self {
            meta,
            spec,
            status: BackupScheduleStatus::default(),
        }
    }
}

impl Resource for BackupScheduleResource {
    const KIND: ResourceKind = ResourceKind::BackupSchedule;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}

/// Desired state of a one-shot backup or restore job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Name of the server resource.
    pub server_ref: String,
    /// Database to back up or restore into.
    pub database: String,
    /// Backup target (bucket/path) resource.
    pub target_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJob {
    pub meta: ResourceMeta,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

impl BackupJob {
    pub fn new(meta: ResourceMeta, spec: JobSpec) -> Self {
        Self {
            meta,
            spec,
            status: JobStatus::default(),
        }
    }
}

impl Resource for BackupJob {
    const KIND: ResourceKind = ResourceKind::BackupJob;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreJob {
    pub meta: ResourceMeta,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

impl RestoreJob {
    pub fn new(meta: ResourceMeta, spec: JobSpec) -> Self {
        Self {
            meta,
            spec,
            status: JobStatus::default(),
        }
    }
}

impl Resource for RestoreJob {
    const KIND: ResourceKind = ResourceKind::RestoreJob;

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}

/// Alias kept for call sites that deal with either job flavor generically.
pub type BackupJobSpec = JobSpec;
