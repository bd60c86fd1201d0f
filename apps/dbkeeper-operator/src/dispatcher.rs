//! Watch-event dispatch.
//!
//! One reconciliation lane per (kind, namespace, name) key: events for the
//! same instance are serialized and coalesced, while distinct instances
//! reconcile concurrently. The reconciler assumes this serialization and
//! does not lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use async_trait::async_trait;
use dbkeeper_core::ResourceKey;
use dbkeeper_reconcile::{ReconcileStrategy, Reconciler};

/// One change notification from the declared-resource store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: ResourceKey,
}

impl WatchEvent {
    pub fn new(key: ResourceKey) -> Self {
        Self { key }
    }
}

/// The consumed notification stream. `None` ends dispatch.
#[async_trait]
pub trait Watcher: Send {
    async fn next_event(&mut self) -> Option<WatchEvent>;
}

/// Builds a fresh per-pass strategy for a resource key. `None` means this
/// operator instance does not handle the kind.
pub trait StrategyFactory: Send + Sync {
    fn strategy(&self, key: &ResourceKey) -> Option<Box<dyn ReconcileStrategy>>;
}

pub struct Dispatcher {
    factory: Arc<dyn StrategyFactory>,
    reconciler: Arc<Reconciler>,
    lanes: Mutex<HashMap<ResourceKey, mpsc::UnboundedSender<()>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn StrategyFactory>, reconciler: Reconciler) -> Self {
        Self {
            factory,
            reconciler: Arc::new(reconciler),
            lanes: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Route one event to its instance lane, creating the lane on first use.
    pub async fn dispatch(&self, event: WatchEvent) {
        let mut lanes = self.lanes.lock().await;
        if let Some(sender) = lanes.get(&event.key) {
            if sender.send(()).is_ok() {
                return;
            }
            // Lane ended; fall through and start a new one.
        }
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(()).is_err() {
            return;
        }
        let key = event.key.clone();
        let factory = self.factory.clone();
        let reconciler = self.reconciler.clone();
        self.tasks
            .lock()
            .await
            .spawn(run_lane(key.clone(), factory, reconciler, rx));
        lanes.insert(key, tx);
    }

    /// Drain events until the watcher ends, then wait for in-flight passes.
    pub async fn run<W: Watcher>(&self, mut watcher: W) {
        while let Some(event) = watcher.next_event().await {
            self.dispatch(event).await;
        }
        self.shutdown().await;
    }

    /// Stop accepting events and wait for every lane to finish its current
    /// pass. In-flight statements are left to complete naturally.
    pub async fn shutdown(&self) {
        self.lanes.lock().await.clear();
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "reconcile lane panicked");
            }
        }
    }
}

async fn run_lane(
    key: ResourceKey,
    factory: Arc<dyn StrategyFactory>,
    reconciler: Arc<Reconciler>,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    let mut requeue = None;
    loop {
        match requeue.take() {
            Some(delay) => {
                // A requeued pass runs after the delay unless a fresh event
                // (or shutdown) arrives first.
                tokio::select! {
                    event = rx.recv() => {
                        if event.is_none() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                if rx.recv().await.is_none() {
                    return;
                }
            }
        }
        // Coalesce whatever queued up while the last pass ran.
        while rx.try_recv().is_ok() {}

        let Some(mut strategy) = factory.strategy(&key) else {
            warn!(key = %key, "no strategy registered for resource kind");
            continue;
        };
        debug!(key = %key, "reconciling");
        let outcome = reconciler.reconcile(strategy.as_mut()).await;
        requeue = outcome.requeue_after;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use dbkeeper_core::{OperatorResult, ResourceKind, ResourceMeta};
    use dbkeeper_reconcile::ReconcileStep;

    struct Probe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        runs: AtomicUsize,
        /// Requeue delays handed out, consumed front to back.
        requeues: Mutex<Vec<Duration>>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                runs: AtomicUsize::new(0),
                requeues: Mutex::new(Vec::new()),
            }
        }
    }

    struct ProbeStrategy {
        probe: Arc<Probe>,
        meta: ResourceMeta,
    }

    #[async_trait]
    impl ReconcileStrategy for ProbeStrategy {
        async fn load_cr(&mut self) -> OperatorResult<bool> {
            Ok(true)
        }

        async fn load_live_state(&mut self) -> OperatorResult<bool> {
            Ok(true)
        }

        async fn ensure_correct(&mut self) -> OperatorResult<ReconcileStep> {
            let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
            self.probe.runs.fetch_add(1, Ordering::SeqCst);

            let mut requeues = self.probe.requeues.lock().await;
            if requeues.is_empty() {
                Ok(ReconcileStep::Done)
            } else {
                Ok(ReconcileStep::RequeueAfter(requeues.remove(0)))
            }
        }

        async fn create_obj(&mut self) -> OperatorResult<ReconcileStep> {
            Ok(ReconcileStep::Done)
        }

        async fn remove_obj(&mut self) -> OperatorResult<ReconcileStep> {
            Ok(ReconcileStep::Done)
        }

        fn meta(&self) -> Option<&ResourceMeta> {
            Some(&self.meta)
        }

        async fn set_finalizer(&mut self, _present: bool) -> OperatorResult<()> {
            Ok(())
        }

        async fn release(&mut self) {}
    }

    struct ProbeFactory {
        probes: std::sync::Mutex<HashMap<ResourceKey, Arc<Probe>>>,
    }

    impl ProbeFactory {
        fn new() -> Self {
            Self {
                probes: std::sync::Mutex::new(HashMap::new()),
            }
        }

        fn probe(&self, key: &ResourceKey) -> Arc<Probe> {
            self.probes
                .lock()
                .unwrap()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Probe::new()))
                .clone()
        }
    }

    impl StrategyFactory for ProbeFactory {
        fn strategy(&self, key: &ResourceKey) -> Option<Box<dyn ReconcileStrategy>> {
            Some(Box::new(ProbeStrategy {
                probe: self.probe(key),
                meta: ResourceMeta::new(&key.namespace, &key.name),
            }))
        }
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new(ResourceKind::Database, "default", name)
    }

    #[tokio::test]
    async fn same_instance_events_never_overlap() {
        let factory = Arc::new(ProbeFactory::new());
        let dispatcher = Dispatcher::new(factory.clone(), Reconciler::default());

        let k = key("orders");
        for _ in 0..5 {
            dispatcher.dispatch(WatchEvent::new(k.clone())).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.shutdown().await;

        let probe = factory.probe(&k);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
        let runs = probe.runs.load(Ordering::SeqCst);
        assert!(runs >= 1, "at least one pass must run");
        assert!(runs <= 5, "bursts must coalesce, not amplify");
    }

    #[tokio::test]
    async fn distinct_instances_reconcile_independently() {
        let factory = Arc::new(ProbeFactory::new());
        let dispatcher = Dispatcher::new(factory.clone(), Reconciler::default());

        let a = key("a");
        let b = key("b");
        dispatcher.dispatch(WatchEvent::new(a.clone())).await;
        dispatcher.dispatch(WatchEvent::new(b.clone())).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.shutdown().await;

        assert!(factory.probe(&a).runs.load(Ordering::SeqCst) >= 1);
        assert!(factory.probe(&b).runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn requeue_schedules_a_followup_pass() {
        let factory = Arc::new(ProbeFactory::new());
        let dispatcher = Dispatcher::new(factory.clone(), Reconciler::default());

        let k = key("orders");
        let probe = factory.probe(&k);
        probe
            .requeues
            .lock()
            .await
            .push(Duration::from_millis(10));

        dispatcher.dispatch(WatchEvent::new(k.clone())).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        dispatcher.shutdown().await;

        assert!(
            probe.runs.load(Ordering::SeqCst) >= 2,
            "requeue must trigger a second pass without a new event"
        );
    }
}
