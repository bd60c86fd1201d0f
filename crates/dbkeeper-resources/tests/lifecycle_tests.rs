//! Full resource lifecycles against the in-memory store and adapter.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbkeeper_conn::Credential;
use dbkeeper_core::resources::{
    BackupJob, DatabaseResource, DatabaseSpec, DbPriv, JobSpec, Phase, Resource, SchemaResource,
    SchemaSpec, UserResource, UserSpec,
};
use dbkeeper_core::{MemoryStore, OperatorResult, ResourceKey, ResourceMeta, ResourceStore};
use dbkeeper_dialect::ServerProduct;
use dbkeeper_reconcile::Reconciler;
use dbkeeper_resources::{
    DatabaseStrategy, JobRunner, JobState, JobStrategy, SchemaStrategy, UserStrategy,
};

use common::{FakeSource, MockAdapter};

const SERVER: &str = "prod-pg";

fn database_resource(name: &str, drop_on_delete: bool) -> DatabaseResource {
    DatabaseResource::new(
        ResourceMeta::new("default", name),
        DatabaseSpec {
            server_ref: SERVER.into(),
            database: None,
            owner: None,
            drop_on_delete,
        },
    )
}

fn user_resource(name: &str, privileges: Vec<DbPriv>) -> UserResource {
    UserResource::new(
        ResourceMeta::new("default", name),
        UserSpec {
            server_ref: SERVER.into(),
            username: None,
            secret_ref: format!("{name}-credentials"),
            server_privs: String::new(),
            privileges,
        },
    )
}

fn db_priv(scope: &str, privs: &str) -> DbPriv {
    DbPriv {
        scope: scope.into(),
        privs: privs.into(),
        default_privs: String::new(),
        grantor: String::new(),
    }
}

#[tokio::test]
async fn database_lifecycle_with_drop_on_delete() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(FakeSource::new(adapter.clone(), SERVER));
    let store = Arc::new(MemoryStore::new());
    store.insert(database_resource("orders", true)).await;

    let reconciler = Reconciler::default();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "orders");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert!(adapter.has_database("orders"));

    let record = store.get("default", "orders").await.unwrap().unwrap();
    assert!(record.meta.has_finalizer());
    assert_eq!(record.status.phase, Phase::Ready);

    // A second pass converges without reissuing DDL.
    let log_before = adapter.log().len();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "orders");
    reconciler.reconcile(&mut strategy).await;
    assert_eq!(adapter.log().len(), log_before);

    // Deletion drops the database and drains the record.
    store.delete("default", "orders").await.unwrap();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "orders");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert!(!adapter.has_database("orders"));
    assert!(store.get("default", "orders").await.unwrap().is_none());
}

#[tokio::test]
async fn database_without_drop_on_delete_is_left_in_place() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(FakeSource::new(adapter.clone(), SERVER));
    let store = Arc::new(MemoryStore::new());
    store.insert(database_resource("keepme", false)).await;

    let reconciler = Reconciler::default();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "keepme");
    reconciler.reconcile(&mut strategy).await;

    store.delete("default", "keepme").await.unwrap();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "keepme");
    reconciler.reconcile(&mut strategy).await;

    assert!(store.get("default", "keepme").await.unwrap().is_none());
    assert!(adapter.has_database("keepme"), "database must survive detach");
}

#[tokio::test]
async fn connections_are_released_on_every_pass() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(FakeSource::new(adapter.clone(), SERVER));
    let store = Arc::new(MemoryStore::new());
    store.insert(database_resource("orders", true)).await;

    let reconciler = Reconciler::default();
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "orders");
    reconciler.reconcile(&mut strategy).await;
    assert_eq!(source.close_count(), 1);

    // Failure path releases too: the server reference stops resolving.
    let mut broken = database_resource("broken", true);
    broken.spec.server_ref = "missing".into();
    store.insert(broken).await;
    let mut strategy = DatabaseStrategy::new(store.clone(), source.clone(), "default", "broken");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_some());
    assert_eq!(source.close_count(), 2);
}

#[tokio::test]
async fn user_creation_converges_privileges_and_is_idempotent() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(
        FakeSource::new(adapter.clone(), SERVER)
            .with_credential("app-credentials", Credential::new("app", "s3cret")),
    );
    let store = Arc::new(MemoryStore::new());
    store
        .insert(user_resource("app", vec![db_priv("appdb", "CONNECT,CREATE")]))
        .await;

    let reconciler = Reconciler::default();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert!(adapter.has_user("app"));
    let log = adapter.log();
    assert!(log.iter().any(|s| s == "CREATE ROLE app"));
    assert!(log
        .iter()
        .any(|s| s == "GRANT CONNECT, CREATE ON DATABASE appdb TO app"));

    // Second pass: nothing to do.
    let log_before = adapter.log().len();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert_eq!(adapter.log().len(), log_before);

    let record = store.get("default", "app").await.unwrap().unwrap();
    assert!(record.meta.has_finalizer());
    assert_eq!(record.status.phase, Phase::Ready);
}

#[tokio::test]
async fn user_privilege_drift_is_corrected_minimally() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(
        FakeSource::new(adapter.clone(), SERVER)
            .with_credential("app-credentials", Credential::new("app", "s3cret")),
    );
    let store = Arc::new(MemoryStore::new());
    store
        .insert(user_resource("app", vec![db_priv("appdb", "CONNECT")]))
        .await;

    let reconciler = Reconciler::default();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    reconciler.reconcile(&mut strategy).await;

    // Someone grants CREATE out of band; the next pass revokes exactly it.
    {
        let mut state = adapter.state.lock().unwrap();
        state
            .privs
            .get_mut(&("app".to_string(), "database:appdb".to_string()))
            .unwrap()
            .insert("CREATE".to_string());
    }
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    reconciler.reconcile(&mut strategy).await;
    let log = adapter.log();
    assert!(log
        .iter()
        .any(|s| s == "REVOKE CREATE ON DATABASE appdb FROM app"));
    assert!(!log.iter().any(|s| s.contains("REVOKE CONNECT")));
}

#[tokio::test]
async fn invalid_privilege_token_is_terminal_and_grants_nothing() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(
        FakeSource::new(adapter.clone(), SERVER)
            .with_credential("app-credentials", Credential::new("app", "s3cret")),
    );
    let store = Arc::new(MemoryStore::new());
    store
        .insert(user_resource("app", vec![db_priv("appdb", "CONNECT,FLY")]))
        .await;

    let reconciler = Reconciler::default();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    let outcome = reconciler.reconcile(&mut strategy).await;

    let failure = outcome.failure.expect("invalid token must surface");
    assert!(failure.is_invalid_spec());
    assert!(failure.to_string().contains("FLY"));
    assert!(outcome.requeue_after.is_none(), "spec errors are not retried");
    assert!(!adapter.log().iter().any(|s| s.starts_with("GRANT")));
}

#[tokio::test]
async fn user_missing_secret_backs_off() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(FakeSource::new(adapter.clone(), SERVER));
    let store = Arc::new(MemoryStore::new());
    store.insert(user_resource("app", vec![])).await;

    let reconciler = Reconciler::default();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    let outcome = reconciler.reconcile(&mut strategy).await;

    assert!(outcome.requeue_after.is_some());
    assert!(outcome.failure.unwrap().is_not_found());
    assert!(!adapter.has_user("app"));
    let record = store.get("default", "app").await.unwrap().unwrap();
    assert!(!record.meta.has_finalizer());
}

#[tokio::test]
async fn user_deletion_drops_the_role() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(
        FakeSource::new(adapter.clone(), SERVER)
            .with_credential("app-credentials", Credential::new("app", "s3cret")),
    );
    let store = Arc::new(MemoryStore::new());
    store.insert(user_resource("app", vec![])).await;

    let reconciler = Reconciler::default();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    reconciler.reconcile(&mut strategy).await;

    store.delete("default", "app").await.unwrap();
    let mut strategy = UserStrategy::new(store.clone(), source.clone(), "default", "app");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert!(!adapter.has_user("app"));
    assert!(store.get("default", "app").await.unwrap().is_none());
}

#[tokio::test]
async fn schema_lifecycle() {
    let adapter = Arc::new(MockAdapter::new(ServerProduct::Postgres));
    let source = Arc::new(FakeSource::new(adapter.clone(), SERVER));
    let store = Arc::new(MemoryStore::new());
    store
        .insert(SchemaResource::new(
            ResourceMeta::new("default", "reporting"),
            SchemaSpec {
                server_ref: SERVER.into(),
                database: "appdb".into(),
                schema: None,
                owner: Some("app".into()),
            },
        ))
        .await;

    let reconciler = Reconciler::default();
    let mut strategy = SchemaStrategy::new(store.clone(), source.clone(), "default", "reporting");
    reconciler.reconcile(&mut strategy).await;
    assert!(adapter.log().iter().any(|s| s == "CREATE SCHEMA reporting"));

    store.delete("default", "reporting").await.unwrap();
    let mut strategy = SchemaStrategy::new(store.clone(), source.clone(), "default", "reporting");
    reconciler.reconcile(&mut strategy).await;
    assert!(adapter.log().iter().any(|s| s == "DROP SCHEMA reporting"));
    assert!(store.get("default", "reporting").await.unwrap().is_none());
}

// Job runner fake: jobs advance state when the test tells them to.

#[derive(Default)]
struct FakeJobRunner {
    jobs: Mutex<HashMap<ResourceKey, JobState>>,
}

impl FakeJobRunner {
    fn finish(&self, key: &ResourceKey, state: JobState) {
        self.jobs.lock().unwrap().insert(key.clone(), state);
    }
}

#[async_trait]
impl JobRunner for FakeJobRunner {
    async fn exists(&self, key: &ResourceKey) -> OperatorResult<bool> {
        Ok(self.jobs.lock().unwrap().contains_key(key))
    }

    async fn launch(&self, key: &ResourceKey, _spec: &JobSpec) -> OperatorResult<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(key.clone(), JobState::Running);
        Ok(())
    }

    async fn state(&self, key: &ResourceKey) -> OperatorResult<JobState> {
        self.jobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| dbkeeper_core::OperatorError::not_found(format!("job {key}")))
    }

    async fn remove(&self, key: &ResourceKey) -> OperatorResult<()> {
        self.jobs.lock().unwrap().remove(key);
        Ok(())
    }
}

fn backup_job(name: &str) -> BackupJob {
    BackupJob::new(
        ResourceMeta::new("default", name),
        JobSpec {
            server_ref: SERVER.into(),
            database: "appdb".into(),
            target_ref: "s3://backups/appdb".into(),
        },
    )
}

#[tokio::test]
async fn backup_job_runs_to_completion() {
    let runner = Arc::new(FakeJobRunner::default());
    let store = Arc::new(MemoryStore::new());
    let job = backup_job("nightly");
    let key = job.key();
    store.insert(job).await;

    let reconciler = Reconciler::default();
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "nightly");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.requeue_after.is_some(), "launch polls for completion");

    let record = store.get("default", "nightly").await.unwrap().unwrap();
    assert_eq!(record.status.phase, Phase::Creating);
    assert!(record.status.started_at.is_some());

    runner.finish(&key, JobState::Succeeded);
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "nightly");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.requeue_after.is_none());

    let record = store.get("default", "nightly").await.unwrap().unwrap();
    assert_eq!(record.status.phase, Phase::Ready);
    assert!(record.status.finished_at.is_some());
    assert!(record.meta.has_finalizer());
}

#[tokio::test]
async fn failed_job_is_reported_and_not_relaunched() {
    let runner = Arc::new(FakeJobRunner::default());
    let store = Arc::new(MemoryStore::new());
    let job = backup_job("flaky");
    let key = job.key();
    store.insert(job).await;

    let reconciler = Reconciler::default();
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "flaky");
    reconciler.reconcile(&mut strategy).await;

    runner.finish(&key, JobState::Failed("disk full".into()));
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "flaky");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.requeue_after.is_none());

    let record = store.get("default", "flaky").await.unwrap().unwrap();
    assert_eq!(record.status.phase, Phase::Failed);
    assert_eq!(record.status.message, "disk full");
}

#[tokio::test]
async fn job_deletion_removes_the_job() {
    let runner = Arc::new(FakeJobRunner::default());
    let store = Arc::new(MemoryStore::new());
    let job = backup_job("nightly");
    let key = job.key();
    store.insert(job).await;

    let reconciler = Reconciler::default();
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "nightly");
    reconciler.reconcile(&mut strategy).await;

    store.delete("default", "nightly").await.unwrap();
    let mut strategy = JobStrategy::new(store.clone(), runner.clone(), "default", "nightly");
    let outcome = reconciler.reconcile(&mut strategy).await;
    assert!(outcome.failure.is_none());
    assert!(!runner.jobs.lock().unwrap().contains_key(&key));
    assert!(store.get("default", "nightly").await.unwrap().is_none());
}
