//! Declared-resource store capability.
//!
//! The operator consumes this interface; it never owns resource storage.
//! [`MemoryStore`] implements the same contract in-process, including the
//! finalizer protocol (a terminating resource survives until its finalizer
//! list drains), and backs the test suites and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::{OperatorError, OperatorResult};
use crate::resources::Resource;

/// Equality-match label selector used to enumerate previously-created
/// live job/schedule records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// CRUD + finalizer access over typed resource records.
#[async_trait]
pub trait ResourceStore<R: Resource>: Send + Sync {
    /// Fetch one resource. `Ok(None)` when the record no longer exists.
    async fn get(&self, namespace: &str, name: &str) -> OperatorResult<Option<R>>;

    /// Write back status and metadata (finalizer list). The spec is never
    /// modified through this path.
    async fn update(&self, resource: &R) -> OperatorResult<()>;

    /// Enumerate resources in a namespace matching the selector.
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> OperatorResult<Vec<R>>;

    /// Request deletion. The record is marked terminating while finalizers
    /// remain, and removed outright once the list is empty.
    async fn delete(&self, namespace: &str, name: &str) -> OperatorResult<()>;
}

/// In-memory store honoring the finalizer protocol.
pub struct MemoryStore<R: Resource> {
    records: RwLock<HashMap<(String, String), R>>,
}

impl<R: Resource> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a record, bypassing the operator-facing contract.
    pub async fn insert(&self, resource: R) {
        let key = (
            resource.meta().namespace.clone(),
            resource.meta().name.clone(),
        );
        self.records.write().await.insert(key, resource);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<R: Resource> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> ResourceStore<R> for MemoryStore<R> {
    async fn get(&self, namespace: &str, name: &str) -> OperatorResult<Option<R>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn update(&self, resource: &R) -> OperatorResult<()> {
        let key = (
            resource.meta().namespace.clone(),
            resource.meta().name.clone(),
        );
        let mut records = self.records.write().await;
        let Some(existing) = records.get_mut(&key) else {
            return Err(OperatorError::store(format!(
                "update of missing record {}/{}",
                key.0, key.1
            )));
        };
        *existing = resource.clone();
        // Terminating record with a drained finalizer list is removed,
        // matching the owning API's deletion guarantee.
        if existing.meta().marked_for_deletion() && existing.meta().finalizers.is_empty() {
            records.remove(&key);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str, selector: &LabelSelector) -> OperatorResult<Vec<R>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.meta().namespace == namespace && selector.matches(&r.meta().labels))
            .cloned()
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        let key = (namespace.to_string(), name.to_string());
        let mut records = self.records.write().await;
        let Some(existing) = records.get_mut(&key) else {
            return Err(OperatorError::not_found(format!(
                "resource {namespace}/{name}"
            )));
        };
        if existing.meta().finalizers.is_empty() {
            records.remove(&key);
        } else if existing.meta().deleted_at.is_none() {
            existing.meta_mut().deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}
