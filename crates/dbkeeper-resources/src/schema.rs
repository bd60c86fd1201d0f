//! Schema strategy: one named schema inside a referenced database.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use dbkeeper_core::resources::{Phase, SchemaResource};
use dbkeeper_core::store::ResourceStore;
use dbkeeper_core::{OperatorError, OperatorResult, ResourceMeta};
use dbkeeper_dialect::DialectAdapter;
use dbkeeper_reconcile::{ReconcileStep, ReconcileStrategy};

use crate::source::AdapterSource;

pub struct SchemaStrategy {
    store: Arc<dyn ResourceStore<SchemaResource>>,
    source: Arc<dyn AdapterSource>,
    namespace: String,
    name: String,
    resource: Option<SchemaResource>,
    adapter: Option<Arc<dyn DialectAdapter>>,
}

impl SchemaStrategy {
    pub fn new(
        store: Arc<dyn ResourceStore<SchemaResource>>,
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

    fn resource(&self) -> OperatorResult<&SchemaResource> {
        self.resource
            .as_ref()
            .ok_or_else(|| OperatorError::internal("schema strategy has no loaded resource"))
    }

    fn adapter(&self) -> OperatorResult<&Arc<dyn DialectAdapter>> {
        self.adapter
            .as_ref()
            .ok_or_else(|| OperatorError::internal("schema strategy has no adapter"))
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
}

#[async_trait]
impl ReconcileStrategy for SchemaStrategy {
    async fn load_cr(&mut self) -> OperatorResult<bool> {
        self.resource = self.store.get(&self.namespace, &self.name).await?;
        Ok(self.resource.is_some())
    }

    async fn load_live_state(&mut self) -> OperatorResult<bool> {
        let resource = self.resource()?;
        // Schema DDL runs connected to the owning database.
        let adapter = self
            .source
            .adapter(&resource.spec.server_ref, Some(&resource.spec.database))
            .await?;
        let exists = adapter.schema_exists(resource.schema_name()).await?;
        self.adapter = Some(adapter);
        Ok(exists)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep> {
        self.write_status(Phase::Ready, "schema present").await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn create_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let resource = self.resource()?;
        let name = resource.schema_name().to_string();
        let owner = resource.spec.owner.clone();
        self.adapter()?.create_schema(&name, owner.as_deref()).await?;
        info!(schema = %name, database = %resource.spec.database, "created schema");
        self.write_status(Phase::Ready, "schema created").await?;
        Ok(ReconcileStep::Done)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep> {
        let resource = self.resource()?;
        let name = resource.schema_name().to_string();
        self.adapter()?.drop_schema(&name).await?;
        info!(schema = %name, "dropped schema");
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
