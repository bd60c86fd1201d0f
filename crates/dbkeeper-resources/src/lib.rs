//! dbkeeper per-kind reconciliation strategies.
//!
//! One [`ReconcileStrategy`](dbkeeper_reconcile::ReconcileStrategy)
//! implementation per managed resource kind, each built on the connection
//! provider and dialect adapters. The user strategy delegates privilege
//! changes to the convergence engine; the backup schedule strategy drives
//! the distributed dialect's schedule sub-API; jobs run through the
//! consumed [`JobRunner`] capability.

pub mod database;
pub mod job;
pub mod schedule;
pub mod schema;
pub mod source;
pub mod user;

pub use database::DatabaseStrategy;
pub use job::{BackupJobStrategy, JobRecord, JobRunner, JobState, JobStrategy, RestoreJobStrategy};
pub use schedule::{
    BackupScheduleStrategy, CockroachScheduleApi, ScheduleApi, ScheduleRecord, ScheduleSource,
};
pub use schema::SchemaStrategy;
pub use source::{AdapterSource, ConnAdapterSource};
pub use user::UserStrategy;
