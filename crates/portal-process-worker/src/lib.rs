//! Process worker
//!
//! Builds a store, registers the step handlers and runs the configured
//! number of step executors until shutdown.

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};

use portal_process_core::{
    AuditingProcessStore, Clock, HandlerRegistry, ProcessStore, StepExecutor, SystemClock,
};
use portal_process_inmemory::InMemoryProcessStore;
use portal_process_monitoring::LogExt;
use portal_process_postgres::PostgresProcessStore;

pub mod config;
pub mod handlers;

pub use config::WorkerConfig;

/// Run the worker until Ctrl-C
pub async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = create_store(&config, clock.clone()).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
    };

    run_executors(store, handlers::default_registry(), clock, &config, shutdown).await
}

/// Create the configured store, wrapped in the audit trail
pub async fn create_store(
    config: &WorkerConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn ProcessStore>> {
    let store: Arc<dyn ProcessStore> = match config.postgres() {
        Some(postgres) => {
            info!("Using PostgreSQL process store");
            let store = PostgresProcessStore::connect(&postgres)
                .await
                .log_err("Failed to open PostgreSQL store")
                .context("Failed to open PostgreSQL store")?;
            Arc::new(AuditingProcessStore::new(store, clock))
        }
        None => {
            info!("Using in-memory process store");
            Arc::new(AuditingProcessStore::new(InMemoryProcessStore::new(), clock))
        }
    };
    Ok(store)
}

/// Run `worker_count` executors over `store` until `shutdown` completes
pub async fn run_executors<F>(
    store: Arc<dyn ProcessStore>,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    config: &WorkerConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::with_capacity(config.executor.worker_count);
    for worker in 0..config.executor.worker_count {
        let executor = StepExecutor::new(
            store.clone(),
            handlers.clone(),
            clock.clone(),
            config.executor.clone(),
        );
        let shutdown_rx = shutdown_rx.clone();
        workers.push(tokio::spawn(
            async move { executor.run(shutdown_rx).await }.instrument(info_span!("executor", worker)),
        ));
    }
    info!(workers = workers.len(), "Process worker started");

    shutdown.await;
    // Receivers only disappear once every executor has stopped
    let _ = shutdown_tx.send(true);

    for result in futures::future::join_all(workers).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Executor stopped with error: {}", e),
            Err(e) => error!("Executor task failed: {}", e),
        }
    }

    info!("Process worker stopped");
    Ok(())
}
