//! Operator wiring: stores, per-pass sources and the strategy factory.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use async_trait::async_trait;
use dbkeeper_conn::{ConnectionProvider, PoolFactory, ServerResolver};
use dbkeeper_core::resources::{
    BackupJob, BackupScheduleResource, DatabaseResource, RestoreJob, SchemaResource, UserResource,
};
use dbkeeper_core::store::{LabelSelector, ResourceStore};
use dbkeeper_core::{Resource, ResourceKey, ResourceKind};
use dbkeeper_reconcile::ReconcileStrategy;
use dbkeeper_resources::{
    BackupScheduleStrategy, ConnAdapterSource, DatabaseStrategy, JobRunner, JobStrategy,
    SchemaStrategy, UserStrategy,
};

use crate::dispatcher::{StrategyFactory, WatchEvent, Watcher};

/// Typed handles to the declared-resource stores, one per kind.
#[derive(Clone)]
pub struct Stores {
    pub databases: Arc<dyn ResourceStore<DatabaseResource>>,
    pub users: Arc<dyn ResourceStore<UserResource>>,
    pub schemas: Arc<dyn ResourceStore<SchemaResource>>,
    pub schedules: Arc<dyn ResourceStore<BackupScheduleResource>>,
    pub backup_jobs: Arc<dyn ResourceStore<BackupJob>>,
    pub restore_jobs: Arc<dyn ResourceStore<RestoreJob>>,
}

/// Builds a fresh strategy (and its per-pass connection provider) for each
/// reconciliation. Concurrent passes never share handles.
pub struct OperatorFactory {
    stores: Stores,
    resolver: Arc<dyn ServerResolver>,
    pools: Arc<dyn PoolFactory>,
    /// Job execution backend; job resources are skipped when absent.
    jobs: Option<Arc<dyn JobRunner>>,
}

impl OperatorFactory {
    pub fn new(
        stores: Stores,
        resolver: Arc<dyn ServerResolver>,
        pools: Arc<dyn PoolFactory>,
        jobs: Option<Arc<dyn JobRunner>>,
    ) -> Self {
        Self {
            stores,
            resolver,
            pools,
            jobs,
        }
    }

    fn pass_source(&self) -> Arc<ConnAdapterSource> {
        Arc::new(ConnAdapterSource::new(Arc::new(ConnectionProvider::new(
            self.resolver.clone(),
            self.pools.clone(),
        ))))
    }
}

impl StrategyFactory for OperatorFactory {
    fn strategy(&self, key: &ResourceKey) -> Option<Box<dyn ReconcileStrategy>> {
        let (namespace, name) = (&key.namespace, &key.name);
        match key.kind {
            ResourceKind::Database => Some(Box::new(DatabaseStrategy::new(
                self.stores.databases.clone(),
                self.pass_source(),
                namespace,
                name,
            ))),
            ResourceKind::User => Some(Box::new(UserStrategy::new(
                self.stores.users.clone(),
                self.pass_source(),
                namespace,
                name,
            ))),
            ResourceKind::Schema => Some(Box::new(SchemaStrategy::new(
                self.stores.schemas.clone(),
                self.pass_source(),
                namespace,
                name,
            ))),
            ResourceKind::BackupSchedule => {
                let source = self.pass_source();
                Some(Box::new(BackupScheduleStrategy::new(
                    self.stores.schedules.clone(),
                    source.clone(),
                    source,
                    namespace,
                    name,
                )))
            }
            ResourceKind::BackupJob => self.jobs.as_ref().map(|runner| {
                Box::new(JobStrategy::<BackupJob>::new(
                    self.stores.backup_jobs.clone(),
                    runner.clone(),
                    namespace,
                    name,
                )) as Box<dyn ReconcileStrategy>
            }),
            ResourceKind::RestoreJob => self.jobs.as_ref().map(|runner| {
                Box::new(JobStrategy::<RestoreJob>::new(
                    self.stores.restore_jobs.clone(),
                    runner.clone(),
                    namespace,
                    name,
                )) as Box<dyn ReconcileStrategy>
            }),
        }
    }
}

/// Interval-driven watcher: on every tick it enumerates all stores and
/// emits one event per resource, until the shutdown channel fires.
pub struct ResyncWatcher {
    stores: Stores,
    namespace: String,
    interval: Duration,
    pending: VecDeque<WatchEvent>,
    shutdown: mpsc::Receiver<()>,
    first_tick: bool,
}

impl ResyncWatcher {
    pub fn new(
        stores: Stores,
        namespace: impl Into<String>,
        interval: Duration,
        shutdown: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            stores,
            namespace: namespace.into(),
            interval,
            pending: VecDeque::new(),
            shutdown,
            first_tick: true,
        }
    }

    async fn refill(&mut self) {
        let selector = LabelSelector::default();
        self.extend::<DatabaseResource>(self.stores.databases.list(&self.namespace, &selector).await);
        self.extend::<UserResource>(self.stores.users.list(&self.namespace, &selector).await);
        self.extend::<SchemaResource>(self.stores.schemas.list(&self.namespace, &selector).await);
        self.extend::<BackupScheduleResource>(
            self.stores.schedules.list(&self.namespace, &selector).await,
        );
        self.extend::<BackupJob>(self.stores.backup_jobs.list(&self.namespace, &selector).await);
        self.extend::<RestoreJob>(self.stores.restore_jobs.list(&self.namespace, &selector).await);
    }

    fn extend<R: Resource>(&mut self, listed: dbkeeper_core::OperatorResult<Vec<R>>) {
        match listed {
            Ok(resources) => self
                .pending
                .extend(resources.iter().map(|r| WatchEvent::new(r.key()))),
            Err(err) => warn!(kind = %R::KIND, error = %err, "resync list failed"),
        }
    }
}

#[async_trait]
impl Watcher for ResyncWatcher {
    async fn next_event(&mut self) -> Option<WatchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.first_tick {
                self.first_tick = false;
            } else {
                tokio::select! {
                    _ = self.shutdown.recv() => return None,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            self.refill().await;
            if self.pending.is_empty() {
                // Nothing declared yet; wait out the next interval rather
                // than spinning.
                tokio::select! {
                    _ = self.shutdown.recv() => return None,
                    _ = tokio::time::sleep(self.interval) => {}
                }
                self.refill().await;
            }
        }
    }
}
