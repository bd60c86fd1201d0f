//! The generic reconciliation driver.
//!
//! Kind-agnostic: loads the declared resource and the live state through
//! the strategy, branches on (live exists, marked for deletion), keeps the
//! finalizer in step with external reality, and converts failures into
//! bounded wall-clock backoff. One driver call is one pass; two passes for
//! the same instance are never run concurrently (the dispatch layer
//! serializes per instance key).

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use dbkeeper_core::OperatorError;

use crate::backoff::BackoffConfig;
use crate::strategy::{ReconcileStep, ReconcileStrategy};

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// When to run the next pass, if one is needed.
    pub requeue_after: Option<Duration>,
    /// The failure that caused a retry, for status/log surfacing. Benign
    /// conditions (AlreadyExists on create, NotFound during teardown) are
    /// never reported here.
    pub failure: Option<OperatorError>,
}

impl ReconcileOutcome {
    fn done() -> Self {
        Self::default()
    }

    fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            failure: None,
        }
    }
}

pub struct Reconciler {
    backoff: BackoffConfig,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl Reconciler {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self { backoff }
    }

    /// Run one reconciliation pass. Connections opened by the strategy are
    /// released on every exit path; errors never propagate out of the
    /// driver — they become backoff requeues (or, for invalid specs, a
    /// terminal log entry until the spec changes).
    pub async fn reconcile<S: ReconcileStrategy + ?Sized>(&self, strategy: &mut S) -> ReconcileOutcome {
        let result = self.run(strategy).await;
        strategy.release().await;

        match result {
            Ok(outcome) => outcome,
            Err(err) => self.failure_outcome(strategy, err),
        }
    }

    async fn run<S: ReconcileStrategy + ?Sized>(
        &self,
        strategy: &mut S,
    ) -> Result<ReconcileOutcome, OperatorError> {
        if !strategy.load_cr().await? {
            // The record is gone; the watcher already knows.
            debug!("declared resource no longer exists");
            return Ok(ReconcileOutcome::done());
        }

        let live_exists = match strategy.load_live_state().await {
            Ok(exists) => exists,
            Err(err) if err.is_not_found() => {
                let deleting = strategy
                    .meta()
                    .map(|m| m.marked_for_deletion())
                    .unwrap_or(false);
                if deleting {
                    // The dependency is already gone; nothing external is
                    // left to clean up.
                    info!(error = %err, "dependency gone during teardown, releasing finalizer");
                    strategy.set_finalizer(false).await?;
                    return Ok(ReconcileOutcome::done());
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let meta = strategy
            .meta()
            .ok_or_else(|| OperatorError::internal("strategy loaded no resource metadata"))?;
        let deleting = meta.marked_for_deletion();
        let has_finalizer = meta.has_finalizer();

        match (live_exists, deleting) {
            (true, true) => {
                if has_finalizer {
                    let step = match strategy.remove_obj().await {
                        Ok(step) => step,
                        Err(err) if err.is_not_found() => {
                            info!(error = %err, "live object vanished during removal");
                            ReconcileStep::Done
                        }
                        Err(err) => return Err(err),
                    };
                    if let Some(after) = step.requeue() {
                        // Removal is still in flight; keep the finalizer.
                        return Ok(ReconcileOutcome::requeue(after));
                    }
                }
                strategy.set_finalizer(false).await?;
                Ok(ReconcileOutcome::done())
            }
            (true, false) => {
                let step = strategy.ensure_correct().await?;
                if let Some(after) = step.requeue() {
                    return Ok(ReconcileOutcome::requeue(after));
                }
                strategy.set_finalizer(true).await?;
                Ok(ReconcileOutcome::done())
            }
            (false, true) => {
                // Nothing external remains.
                strategy.set_finalizer(false).await?;
                Ok(ReconcileOutcome::done())
            }
            (false, false) => {
                let step = match strategy.create_obj().await {
                    Ok(step) => step,
                    Err(err) if err.is_already_exists() => {
                        // A previous partially-applied create won the race.
                        debug!(error = %err, "live object already exists, treating as success");
                        ReconcileStep::Done
                    }
                    Err(err) => return Err(err),
                };
                strategy.set_finalizer(true).await?;
                match step.requeue() {
                    Some(after) => Ok(ReconcileOutcome::requeue(after)),
                    None => Ok(ReconcileOutcome::done()),
                }
            }
        }
    }

    fn failure_outcome<S: ReconcileStrategy + ?Sized>(
        &self,
        strategy: &S,
        err: OperatorError,
    ) -> ReconcileOutcome {
        if err.is_invalid_spec() {
            // Retrying cannot help until the spec changes; the watcher will
            // redeliver when it does.
            error!(error = %err, "invalid spec, waiting for a spec change");
            return ReconcileOutcome {
                requeue_after: None,
                failure: Some(err),
            };
        }

        let after = match strategy.meta() {
            Some(meta) => {
                let age = meta
                    .age(Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                self.backoff.delay_for_age(age)
            }
            None => self.backoff.no_resource_retry,
        };
        warn!(error = %err, retry_in = ?after, "reconciliation failed, backing off");
        ReconcileOutcome {
            requeue_after: Some(after),
            failure: Some(err),
        }
    }
}
