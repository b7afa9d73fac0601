//! Background worker: drains the completion queue and polls transient
//! deployments until they settle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chalops_engine::bootstrap::build_engine;
use chalops_engine::{CompletionReconciler, EngineConfig, Reconciler, StatusPoller};
use chalops_events::{CompletionConsumer, CompletionQueue, MemoryCompletionQueue, PgCompletionQueue};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default status poll interval for the worker, in seconds.
const DEFAULT_POLL_SECS: u64 = 30;

/// Time allowed for the loops to observe cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chalops_worker=debug,chalops_engine=debug,chalops_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env(DEFAULT_POLL_SECS);
    let engine = build_engine(&config).await.context("Failed to start engine")?;

    let queue: Arc<dyn CompletionQueue> = match &engine.store.pool {
        Some(pool) => Arc::new(PgCompletionQueue::new(pool.clone())),
        None => {
            tracing::warn!("No database configured; completion queue is process-local");
            Arc::new(MemoryCompletionQueue::new())
        }
    };

    let reconciler = Arc::new(Reconciler::new(engine.store.store.clone()));
    let handler = Arc::new(CompletionReconciler::new(
        reconciler,
        Arc::clone(&engine.orchestrator),
    ));
    let consumer = CompletionConsumer::new(queue, handler);

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    {
        let cancel = cancel.clone();
        tracker.spawn(async move { consumer.run(cancel).await });
    }

    match config.poll_interval {
        Some(interval) => {
            let poller = StatusPoller::new(Arc::clone(&engine.orchestrator), interval);
            let cancel = cancel.clone();
            tracker.spawn(async move { poller.run(cancel).await });
        }
        None => tracing::info!("Status poller disabled"),
    }
    tracker.close();

    tracing::info!("Worker started");
    shutdown_signal().await;

    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        tracing::warn!("Worker tasks did not stop within the grace period");
    }
    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
