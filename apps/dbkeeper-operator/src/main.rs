mod config;
mod dispatcher;
mod logging;
mod operator;
mod resolver;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use dbkeeper_conn::SqlxPoolFactory;
use dbkeeper_core::MemoryStore;
use dbkeeper_reconcile::Reconciler;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::operator::{OperatorFactory, ResyncWatcher, Stores};
use crate::resolver::EnvResolver;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("FATAL: {err}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.name,
        host = %config.server.host,
        product = ?config.server.product,
        namespace = %config.namespace,
        resync_secs = config.resync_secs,
        "starting dbkeeper operator"
    );

    let stores = Stores {
        databases: Arc::new(MemoryStore::new()),
        users: Arc::new(MemoryStore::new()),
        schemas: Arc::new(MemoryStore::new()),
        schedules: Arc::new(MemoryStore::new()),
        backup_jobs: Arc::new(MemoryStore::new()),
        restore_jobs: Arc::new(MemoryStore::new()),
    };

    let resolver = Arc::new(EnvResolver::new(config.server.clone()));
    let factory = Arc::new(OperatorFactory::new(
        stores.clone(),
        resolver,
        Arc::new(SqlxPoolFactory),
        // Job execution needs an external runner; none is wired in yet, so
        // job resources sit untouched until one is.
        None,
    ));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining reconcile lanes");
        let _ = shutdown_tx.send(()).await;
    });

    let watcher = ResyncWatcher::new(
        stores,
        config.namespace.clone(),
        Duration::from_secs(config.resync_secs),
        shutdown_rx,
    );

    let dispatcher = Dispatcher::new(factory, Reconciler::default());
    dispatcher.run(watcher).await;

    info!("shutdown complete");
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
