//! One-shot backup and restore job strategies.
//!
//! Job execution is an external concern: the operator launches a job
//! through the consumed [`JobRunner`] capability, polls it to completion
//! and records the outcome in status. Job template construction stays on
//! the runner's side.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use dbkeeper_core::resources::{BackupJob, JobSpec, JobStatus, Phase, Resource, RestoreJob};
use dbkeeper_core::store::ResourceStore;
use dbkeeper_core::{OperatorError, OperatorResult, ResourceKey, ResourceMeta};
use dbkeeper_reconcile::{ReconcileStep, ReconcileStrategy};

/// How often a running job is re-checked.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Observed state of a launched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed(String),
}

/// Launches and tracks one-shot jobs, keyed by the owning resource.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// True when a job for this resource has been launched and still exists.
    async fn exists(&self, key: &ResourceKey) -> OperatorResult<bool>;

    async fn launch(&self, key: &ResourceKey, spec: &JobSpec) -> OperatorResult<()>;

    async fn state(&self, key: &ResourceKey) -> OperatorResult<JobState>;

    /// Remove the job and its artifacts.
    async fn remove(&self, key: &ResourceKey) -> OperatorResult<()>;
}

/// Resource kinds driven by the job strategy.
pub trait JobRecord: Resource {
    fn job_spec(&self) -> &JobSpec;
    fn job_status(&self) -> &JobStatus;
    fn job_status_mut(&mut self) -> &mut JobStatus;
}

impl JobRecord for BackupJob {
    fn job_spec(&self) -> &JobSpec {
        &self.spec
    }

    fn job_status(&self) -> &JobStatus {
        &self.status
    }

    fn job_status_mut(&mut self) -> &mut JobStatus {
        &mut self.status
    }
}

impl JobRecord for RestoreJob {
    fn job_spec(&self) -> &JobSpec {
        &self.spec
    }

    fn job_status(&self) -> &JobStatus {
        &self.status
    }

    fn job_status_mut(&mut self) -> &mut JobStatus {
        &mut self.status
    }
}

/// Shared strategy for both job flavors; the runner dispatches on the
/// resource kind carried in the key.
pub struct JobStrategy<R: JobRecord> {
    store: Arc<dyn ResourceStore<R>>,
    runner: Arc<dyn JobRunner>,
    namespace: String,
    name: String,
    resource: Option<R>,
}

pub type BackupJobStrategy = JobStrategy<BackupJob>;
pub type RestoreJobStrategy = JobStrategy<RestoreJob>;

impl<R: JobRecord> JobStrategy<R> {
    pub fn new(
        store: Arc<dyn ResourceStore<R>>,
        runner: Arc<dyn JobRunner>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            runner,
            namespace: namespace.into(),
            name: name.into(),
            resource: None,
        }
    }

    fn resource(&self) -> OperatorResult<&R> {
        self.resource
            .as_ref()
            .ok_or_else(|| OperatorError::internal("job strategy has no loaded resource"))
    }

    fn key(&self) -> OperatorResult<ResourceKey> {
        Ok(self.resource()?.key())
    }

    async fn write_status(
        &mut self,
        update: impl FnOnce(&mut JobStatus),
    ) -> OperatorResult<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };
        update(resource.job_status_mut());
        self.store.update(resource).await
    }
}

#[async_trait]
impl<R: JobRecord> ReconcileStrategy for JobStrategy<R> {
    async fn load_cr(&mut self) -> OperatorResult<bool> {
        self.resource = self.store.get(&self.namespace, &self.name).await?;
        Ok(self.resource.is_some())
    }

    async fn load_live_state(&mut self) -> OperatorResult<bool> {
        self.runner.exists(&self.key()?).await
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep> {
        match self.runner.state(&self.key()?).await? {
            JobState::Running => {
                self.write_status(|s| s.phase = Phase::Creating).await?;
                Ok(ReconcileStep::RequeueAfter(POLL_INTERVAL))
            }
            JobState::Succeeded => {
                info!("job finished");
                self.write_status(|s| {
                    s.phase = Phase::Ready;
                    s.message = "job completed".to_string();
                    if s.finished_at.is_none() {
                        s.finished_at = Some(Utc::now());
                    }
                })
                .await?;
                Ok(ReconcileStep::Done)
            }
            JobState::Failed(reason) => {
                // Terminal until the resource is recreated; one-shot jobs
                // are not relaunched behind the user's back.
                warn!(reason = %reason, "job failed");
                self.write_status(|s| {
                    s.phase = Phase::Failed;
                    s.message = reason;
                    if s.finished_at.is_none() {
                        s.finished_at = Some(Utc::now());
                    }
                })
                .await?;
                Ok(ReconcileStep::Done)
            }
        }
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn create_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let key = self.key()?;
        let spec = self.resource()?.job_spec().clone();
        self.runner.launch(&key, &spec).await?;
        info!("launched job");
        self.write_status(|s| {
            s.phase = Phase::Creating;
            s.message = "job launched".to_string();
            s.started_at = Some(Utc::now());
        })
        .await?;
        Ok(ReconcileStep::RequeueAfter(POLL_INTERVAL))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep> {
        self.runner.remove(&self.key()?).await?;
        Ok(ReconcileStep::Done)
    }

    fn meta(&self) -> Option<&ResourceMeta> {
        self.resource.as_ref().map(|r| r.meta())
    }

    async fn set_finalizer(&mut self, present: bool) -> OperatorResult<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };
        let changed = if present {
            resource.meta_mut().add_finalizer()
        } else {
            resource.meta_mut().remove_finalizer()
        };
        if changed {
            self.store.update(resource).await?;
        }
        Ok(())
    }

    async fn release(&mut self) {}
}
