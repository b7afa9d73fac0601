use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chalops_api::config::ServerConfig;
use chalops_api::router::build_app_router;
use chalops_api::state::AppState;
use chalops_engine::bootstrap::build_engine;
use chalops_engine::{EngineConfig, JobLedger, JobPool, LifecycleService, Reconciler, StatusPoller};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chalops_api=debug,chalops_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env(0);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Engine ---
    let engine = build_engine(&engine_config)
        .await
        .unwrap_or_else(|e| panic!("Failed to start engine: {e:#}"));
    let store = engine.store.store.clone();
    let orchestrator = engine.orchestrator;

    let pool = Arc::new(JobPool::start(
        engine_config.pool_workers,
        engine_config.pool_queue,
    ));
    let ledger = Arc::new(JobLedger::new(engine_config.ledger_capacity));
    let service = Arc::new(LifecycleService::new(
        Arc::clone(&orchestrator),
        Arc::clone(&pool),
        ledger,
    ));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&store)));
    tracing::info!(
        workers = engine_config.pool_workers,
        queue = engine_config.pool_queue,
        "Job pool started",
    );

    // --- Status poller (optional) ---
    let background_cancel = CancellationToken::new();
    let poller_handle = engine_config.poll_interval.map(|interval| {
        let poller = StatusPoller::new(Arc::clone(&orchestrator), interval);
        let cancel = background_cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    });

    // --- App state ---
    let state = AppState {
        service,
        reconciler,
        store,
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    background_cancel.cancel();
    if let Some(handle) = poller_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Status poller stopped");
    }

    let drained = pool
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("Background jobs finished");
    } else {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Background jobs still running at shutdown deadline",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
