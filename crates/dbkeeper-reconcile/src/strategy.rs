//! The per-kind strategy capability.
//!
//! The state machine is written once against this interface; every managed
//! resource kind implements it. A strategy instance lives for exactly one
//! reconciliation pass and carries the loaded resource plus whatever
//! connections the pass opened.

use async_trait::async_trait;
use std::time::Duration;

use dbkeeper_core::{OperatorResult, ResourceMeta};

/// Outcome of one strategy step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    /// The step completed; the driver may proceed.
    Done,
    /// The step completed but wants another pass after the given delay
    /// (e.g. waiting on an async backend job).
    RequeueAfter(Duration),
}

impl ReconcileStep {
    pub fn requeue(&self) -> Option<Duration> {
        match self {
            ReconcileStep::Done => None,
            ReconcileStep::RequeueAfter(d) => Some(*d),
        }
    }
}

/// One resource kind's reconciliation behavior.
#[async_trait]
pub trait ReconcileStrategy: Send {
    /// Load the declared resource. `Ok(false)` means the record no longer
    /// exists; the pass stops silently.
    async fn load_cr(&mut self) -> OperatorResult<bool>;

    /// Load the corresponding live external state. `Ok(true)` means the
    /// live object exists. A NotFound error means a dependency (server,
    /// secret) is missing, which the driver classifies.
    async fn load_live_state(&mut self) -> OperatorResult<bool>;

    /// Converge an existing live object toward the spec.
    async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep>;

    /// Create the live object.
    async fn create_obj(&mut self) -> OperatorResult<ReconcileStep>;

    /// Tear the live object down.
    async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep>;

    /// Lifecycle metadata of the loaded resource, when one was loaded.
    fn meta(&self) -> Option<&ResourceMeta>;

    /// Persist finalizer presence through the store. Must be idempotent.
    async fn set_finalizer(&mut self, present: bool) -> OperatorResult<()>;

    /// Release connections and other per-pass state. The driver calls this
    /// on every exit path, including failures.
    async fn release(&mut self);
}
