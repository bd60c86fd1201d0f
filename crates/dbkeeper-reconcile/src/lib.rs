//! dbkeeper reconciliation state machine.
//!
//! The generic driver every managed resource kind shares: lifecycle
//! transitions, finalizer bookkeeping and bounded wall-clock backoff,
//! written once against the [`ReconcileStrategy`] capability.

pub mod backoff;
pub mod driver;
pub mod strategy;

pub use backoff::BackoffConfig;
pub use driver::{ReconcileOutcome, Reconciler};
pub use strategy::{ReconcileStep, ReconcileStrategy};
