//! Backup schedule strategy and the schedule sub-API it drives.
//!
//! Recurring backups exist only on the distributed dialect, which manages
//! them server-side: the operator creates a named schedule once and the
//! backend runs it. Convergence rules:
//!   - `suspend` toggles pause/resume on the existing schedule (same id);
//!   - a changed backup statement drops and recreates (new id);
//!   - status mirrors the backend's schedule catalog row.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use dbkeeper_core::resources::{BackupScheduleResource, Phase};
use dbkeeper_core::store::ResourceStore;
use dbkeeper_core::{OperatorError, OperatorResult, ResourceMeta};
use dbkeeper_dialect::quote::{ident_pg, literal};
use dbkeeper_dialect::{ServerProduct, SqlRow, SqlRunner};
use dbkeeper_reconcile::{ReconcileStep, ReconcileStrategy};

use crate::source::{AdapterSource, ConnAdapterSource};

/// Backend catalog values for `schedule_status`.
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_PAUSED: &str = "PAUSED";

/// One row of the backend's schedule catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub id: i64,
    pub label: String,
    pub schedule_status: String,
    pub state: String,
    pub command: String,
    pub created: String,
}

/// The consumed schedule sub-API: create/pause/resume/drop plus lookup by
/// id and by label.
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    async fn create(
        &self,
        label: &str,
        backup_stmt: &str,
        recurrence: &str,
    ) -> OperatorResult<ScheduleRecord>;

    async fn pause(&self, id: i64) -> OperatorResult<()>;
    async fn resume(&self, id: i64) -> OperatorResult<()>;
    async fn drop(&self, id: i64) -> OperatorResult<()>;

    async fn find_by_id(&self, id: i64) -> OperatorResult<Option<ScheduleRecord>>;
    async fn find_by_label(&self, label: &str) -> OperatorResult<Option<ScheduleRecord>>;
}

/// Hands out a schedule API bound to a server, per pass.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn schedules(&self, server_ref: &str) -> OperatorResult<Arc<dyn ScheduleApi>>;
}

#[async_trait]
impl ScheduleSource for ConnAdapterSource {
    async fn schedules(&self, server_ref: &str) -> OperatorResult<Arc<dyn ScheduleApi>> {
        let product = self.provider().product(server_ref).await?;
        if product != ServerProduct::Cockroach {
            return Err(OperatorError::unsupported(
                product.as_str(),
                "backup schedules",
            ));
        }
        let runner = self.provider().get_connection(server_ref, None, None).await?;
        Ok(Arc::new(CockroachScheduleApi::new(runner)))
    }
}

/// Schedule sub-API over the distributed dialect's schedule statements.
pub struct CockroachScheduleApi {
    runner: Arc<dyn SqlRunner>,
}

impl CockroachScheduleApi {
    pub fn new(runner: Arc<dyn SqlRunner>) -> Self {
        Self { runner }
    }

    async fn find_where(&self, clause: &str) -> OperatorResult<Option<ScheduleRecord>> {
        let sql = format!(
            "SELECT id, label, schedule_status, state, command, created \
             FROM [SHOW SCHEDULES] WHERE {clause}"
        );
        let rows = self.runner.fetch_rows(&sql).await?;
        rows.first().map(parse_schedule_row).transpose()
    }
}

#[async_trait]
impl ScheduleApi for CockroachScheduleApi {
    async fn create(
        &self,
        label: &str,
        backup_stmt: &str,
        recurrence: &str,
    ) -> OperatorResult<ScheduleRecord> {
        let sql = format!(
            "CREATE SCHEDULE {} FOR {} RECURRING {}",
            literal(label),
            backup_stmt,
            literal(recurrence),
        );
        self.runner.execute(&sql).await?;
        self.find_by_label(label).await?.ok_or_else(|| {
            OperatorError::backend(format!("schedule '{label}' missing after create"))
        })
    }

    async fn pause(&self, id: i64) -> OperatorResult<()> {
        self.runner.execute(&format!("PAUSE SCHEDULE {id}")).await?;
        Ok(())
    }

    async fn resume(&self, id: i64) -> OperatorResult<()> {
        self.runner.execute(&format!("RESUME SCHEDULE {id}")).await?;
        Ok(())
    }

    async fn drop(&self, id: i64) -> OperatorResult<()> {
        self.runner.execute(&format!("DROP SCHEDULE {id}")).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> OperatorResult<Option<ScheduleRecord>> {
        self.find_where(&format!("id = {id}")).await
    }

    async fn find_by_label(&self, label: &str) -> OperatorResult<Option<ScheduleRecord>> {
        self.find_where(&format!("label = {}", literal(label))).await
    }
}

fn parse_schedule_row(row: &SqlRow) -> OperatorResult<ScheduleRecord> {
    let id = row
        .get(0)
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| OperatorError::backend("schedule row without a numeric id"))?;
    let col = |idx: usize| row.get(idx).unwrap_or_default().to_string();
    Ok(ScheduleRecord {
        id,
        label: col(1),
        schedule_status: col(2),
        state: col(3),
        command: col(4),
        created: col(5),
    })
}

pub struct BackupScheduleStrategy {
    store: Arc<dyn ResourceStore<BackupScheduleResource>>,
    source: Arc<dyn AdapterSource>,
    schedules: Arc<dyn ScheduleSource>,
    namespace: String,
    name: String,
    resource: Option<BackupScheduleResource>,
    api: Option<Arc<dyn ScheduleApi>>,
    found: Option<ScheduleRecord>,
}

impl BackupScheduleStrategy {
    pub fn new(
        store: Arc<dyn ResourceStore<BackupScheduleResource>>,
        source: Arc<dyn AdapterSource>,
        schedules: Arc<dyn ScheduleSource>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            schedules,
            namespace: namespace.into(),
            name: name.into(),
            resource: None,
            api: None,
            found: None,
        }
    }

    fn resource(&self) -> OperatorResult<&BackupScheduleResource> {
        self.resource
            .as_ref()
            .ok_or_else(|| OperatorError::internal("schedule strategy has no loaded resource"))
    }

    fn api(&self) -> OperatorResult<&Arc<dyn ScheduleApi>> {
        self.api
            .as_ref()
            .ok_or_else(|| OperatorError::internal("schedule strategy has no schedule api"))
    }

    /// The label this resource's schedule carries in the backend catalog.
    fn label(&self) -> String {
        format!("dbkeeper/{}/{}", self.namespace, self.name)
    }

    /// The backup statement the schedule should run. Schedule identity is
    /// this statement text: when it changes, the schedule is recreated.
    fn backup_statement(&self) -> OperatorResult<String> {
        let resource = self.resource()?;
        Ok(format!(
            "BACKUP DATABASE {} INTO {}",
            ident_pg(&resource.spec.database),
            literal(&resource.spec.target_ref),
        ))
    }

    async fn write_status(
        &mut self,
        phase: Phase,
        message: &str,
        record: Option<&ScheduleRecord>,
    ) -> OperatorResult<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };
        resource.status.phase = phase;
        resource.status.message = message.to_string();
        if let Some(record) = record {
            resource.status.schedule_id = Some(record.id);
            resource.status.schedule_status = record.schedule_status.clone();
            resource.status.state = record.state.clone();
            resource.status.command = record.command.clone();
            resource.status.created = record.created.clone();
        }
        self.store.update(resource).await
    }

    /// Refresh the catalog row after a mutation; falls back to the record
    /// the mutation returned when the backend has not surfaced it yet.
    async fn refresh(&self, current: ScheduleRecord) -> OperatorResult<ScheduleRecord> {
        Ok(self.api()?.find_by_id(current.id).await?.unwrap_or(current))
    }
}

#[async_trait]
impl ReconcileStrategy for BackupScheduleStrategy {
    async fn load_cr(&mut self) -> OperatorResult<bool> {
        self.resource = self.store.get(&self.namespace, &self.name).await?;
        Ok(self.resource.is_some())
    }

    async fn load_live_state(&mut self) -> OperatorResult<bool> {
        let resource = self.resource()?;
        let api = self.schedules.schedules(&resource.spec.server_ref).await?;
        let found = api.find_by_label(&self.label()).await?;
        self.api = Some(api);
        self.found = found;
        Ok(self.found.is_some())
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep> {
        let found = self
            .found
            .clone()
            .ok_or_else(|| OperatorError::internal("ensure called without a live schedule"))?;
        let desired_stmt = self.backup_statement()?;
        let suspend = self.resource()?.spec.suspend;
        let label = self.label();
        let recurrence = self.resource()?.spec.recurrence.clone();

        let current = if found.command != desired_stmt {
            // Statement changed: the backend cannot alter a schedule's
            // command, so drop and recreate under a new id.
            let api = self.api()?;
            api.as_ref().drop(found.id).await?;
            let record = api.create(&label, &desired_stmt, &recurrence).await?;
            if suspend {
                api.pause(record.id).await?;
            }
            info!(old_id = found.id, new_id = record.id, "recreated schedule for changed statement");
            self.refresh(record).await?
        } else if suspend && found.schedule_status != STATUS_PAUSED {
            self.api()?.pause(found.id).await?;
            info!(id = found.id, "paused schedule");
            self.refresh(found).await?
        } else if !suspend && found.schedule_status == STATUS_PAUSED {
            self.api()?.resume(found.id).await?;
            info!(id = found.id, "resumed schedule");
            self.refresh(found).await?
        } else {
            found
        };

        self.write_status(Phase::Ready, "schedule in sync", Some(&current))
            .await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn create_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let label = self.label();
        let statement = self.backup_statement()?;
        let resource = self.resource()?;
        let recurrence = resource.spec.recurrence.clone();
        let suspend = resource.spec.suspend;

        let api = self.api()?;
        let record = api.create(&label, &statement, &recurrence).await?;
        if suspend {
            api.pause(record.id).await?;
        }
        info!(id = record.id, "created backup schedule");
        let current = self.refresh(record).await?;
        self.write_status(Phase::Ready, "schedule created", Some(&current))
            .await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let found = self
            .found
            .clone()
            .ok_or_else(|| OperatorError::not_found("schedule already absent"))?;
        self.api()?.as_ref().drop(found.id).await?;
        info!(id = found.id, "dropped backup schedule");
        Ok(ReconcileStep::Done)
    }

    fn meta(&self) -> Option<&ResourceMeta> {
        self.resource.as_ref().map(|r| &r.meta)
    }

    async fn set_finalizer(&mut self, present: bool) -> OperatorResult<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };
        let changed = if present {
            resource.meta.add_finalizer()
        } else {
            resource.meta.remove_finalizer()
        };
        if changed {
            self.store.update(resource).await?;
        }
        Ok(())
    }

    async fn release(&mut self) {
        self.api = None;
        self.found = None;
        self.source.close().await;
    }
}
