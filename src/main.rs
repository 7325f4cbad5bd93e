//! PaperMill server — file transformation job service.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use papermill_core::config::AppConfig;
use papermill_jobs::{JobDispatcher, JobTracker, ProgressBus, RetentionSweeper};
use papermill_store::ArtifactStore;

/// Buffer depth for each progress broadcast channel.
const PROGRESS_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    let env = std::env::var("PAPERMILL_ENV").unwrap_or_else(|_| "default".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting PaperMill v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Artifact store (creates storage areas) ───────────
    tracing::info!(
        "Initializing artifact store at '{}'",
        config.storage.data_dir
    );
    let store = Arc::new(
        ArtifactStore::new(&config.storage)
            .await
            .context("Artifact store init failed")?,
    );

    // ── Step 2: Operation registry ───────────────────────────────
    let registry = Arc::new(papermill_tools::build_registry(&config.tools));
    tracing::info!(
        operations = registry.registered_kinds().len(),
        "Operation registry built"
    );

    // ── Step 3: Dispatcher, tracker and progress bus ─────────────
    let bus = Arc::new(ProgressBus::new(PROGRESS_BUFFER));
    let tracker = Arc::new(JobTracker::new());
    let dispatcher = Arc::new(JobDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&tracker),
        config.worker.max_concurrent_jobs,
    ));
    tracing::info!(
        max_concurrent_jobs = config.worker.max_concurrent_jobs,
        "Job dispatcher ready"
    );

    // ── Step 4: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 5: Retention sweeper ────────────────────────────────
    let sweeper = RetentionSweeper::new(Arc::clone(&store), config.retention.clone());
    let sweeper_cancel = shutdown_rx.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    // ── Step 6: Build and start HTTP server ──────────────────────
    let addr = config.server.bind_addr();
    tracing::info!("Starting HTTP server on {}...", addr);

    let shutdown_grace = std::time::Duration::from_secs(config.server.shutdown_grace_seconds);
    let app_state = papermill_api::AppState::new(
        Arc::new(config),
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::clone(&bus),
    );
    let app = papermill_api::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("PaperMill server listening on {}", addr);

    // ── Step 7: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("Server error")?;

    // ── Step 8: Wait for background tasks ────────────────────────
    tracing::info!("Waiting for background tasks to complete...");
    let _ = tokio::time::timeout(shutdown_grace, sweeper_handle).await;

    tracing::info!("PaperMill server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
