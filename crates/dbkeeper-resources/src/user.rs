//! User strategy: a login role plus converged privileges.
//!
//! Creation and deletion manage the role itself; every successful pass
//! (create or ensure) hands the declared privileges to the convergence
//! engine, which issues the minimal grant/revoke statements.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use dbkeeper_core::resources::{Phase, UserResource};
use dbkeeper_core::store::ResourceStore;
use dbkeeper_core::{OperatorError, OperatorResult, ResourceMeta};
use dbkeeper_dialect::DialectAdapter;
use dbkeeper_privs::{update_user_privs, AdapterProvider};
use dbkeeper_reconcile::{ReconcileStep, ReconcileStrategy};

use crate::source::AdapterSource;

/// Adapter provider for the convergence engine, scoped to one server.
struct ScopedAdapters<'a> {
    source: &'a dyn AdapterSource,
    server_ref: &'a str,
}

#[async_trait]
impl AdapterProvider for ScopedAdapters<'_> {
    async fn adapter(&self, database: Option<&str>) -> OperatorResult<Arc<dyn DialectAdapter>> {
        self.source.adapter(self.server_ref, database).await
    }
}

pub struct UserStrategy {
    store: Arc<dyn ResourceStore<UserResource>>,
    source: Arc<dyn AdapterSource>,
    namespace: String,
    name: String,
    resource: Option<UserResource>,
    adapter: Option<Arc<dyn DialectAdapter>>,
}

impl UserStrategy {
    pub fn new(
        store: Arc<dyn ResourceStore<UserResource>>,
        source: Arc<dyn AdapterSource>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            namespace: namespace.into(),
            name: name.into(),
            resource: None,
            adapter: None,
        }
    }

    fn resource(&self) -> OperatorResult<&UserResource> {
        self.resource
            .as_ref()
            .ok_or_else(|| OperatorError::internal("user strategy has no loaded resource"))
    }

    fn adapter(&self) -> OperatorResult<&Arc<dyn DialectAdapter>> {
        self.adapter
            .as_ref()
            .ok_or_else(|| OperatorError::internal("user strategy has no adapter"))
    }

    async fn write_status(&mut self, phase: Phase, message: &str) -> OperatorResult<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };
        if resource.status.phase == phase && resource.status.message == message {
            return Ok(());
        }
        resource.status.phase = phase;
        resource.status.message = message.to_string();
        self.store.update(resource).await
    }

    /// Converge role attributes and per-scope privileges. Structural spec
    /// validation fails closed before any SQL is issued.
    async fn converge_privileges(&self) -> OperatorResult<bool> {
        let resource = self.resource()?;
        for entry in &resource.spec.privileges {
            entry.validate()?;
        }
        let provider = ScopedAdapters {
            source: self.source.as_ref(),
            server_ref: &resource.spec.server_ref,
        };
        update_user_privs(
            &provider,
            resource.username(),
            &resource.spec.server_privs,
            &resource.spec.privileges,
        )
        .await
    }
}

#[async_trait]
impl ReconcileStrategy for UserStrategy {
    async fn load_cr(&mut self) -> OperatorResult<bool> {
        self.resource = self.store.get(&self.namespace, &self.name).await?;
        Ok(self.resource.is_some())
    }

    async fn load_live_state(&mut self) -> OperatorResult<bool> {
        let resource = self.resource()?;
        let adapter = self
            .source
            .adapter(&resource.spec.server_ref, None)
            .await?;
        let exists = adapter.user_exists(resource.username()).await?;
        self.adapter = Some(adapter);
        Ok(exists)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep> {
        let changed = self.converge_privileges().await?;
        if changed {
            info!("privileges converged");
        } else {
            debug!("privileges already in sync");
        }
        self.write_status(Phase::Ready, "user present, privileges in sync")
            .await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn create_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let resource = self.resource()?;
        let username = resource.username().to_string();
        let credential = self.source.credential(&resource.spec.secret_ref).await?;
        self.adapter()?
            .create_user(&username, Some(&credential.password))
            .await?;
        info!(user = %username, "created role");
        self.converge_privileges().await?;
        self.write_status(Phase::Ready, "user created").await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let resource = self.resource()?;
        let username = resource.username().to_string();
        self.adapter()?.drop_user(&username).await?;
        info!(user = %username, "dropped role");
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
        self.adapter = None;
        self.source.close().await;
    }
}
