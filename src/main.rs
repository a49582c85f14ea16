//! PitchForge Server: background job subsystem for script ingestion.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use pitchforge_api::{AppState, build_app};
use pitchforge_core::config::AppConfig;
use pitchforge_core::error::AppError;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_store::{LocalBlobStore, StoreManager};
use pitchforge_worker::{IntervalScheduler, OffloadManager};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("PITCHFORGE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
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
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting PitchForge v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Queue store ──────────────────────────────────────
    tracing::info!(
        "Initializing queue store (provider: {})...",
        config.store.provider
    );
    let store = Arc::new(StoreManager::new(&config.store).await?);

    // ── Step 2: Blob store ───────────────────────────────────────
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.blobs.root).await?);
    tracing::info!("Blob store rooted at {}", config.blobs.root);

    // ── Step 3: Worker offload ───────────────────────────────────
    let offload = Arc::new(OffloadManager::new(&config.offload));
    tracing::info!(
        runtime = ?config.offload.runtime,
        offload = offload.can_offload(),
        "Worker offload initialized"
    );

    // ── Step 4: Application state ────────────────────────────────
    let state = AppState::new(config.clone(), store, blobs, offload.clone());

    // ── Step 5: Interval scheduler ───────────────────────────────
    let mut scheduler = if config.scheduler.enabled {
        let scheduler = IntervalScheduler::new(
            state.processor.clone(),
            config.scheduler.clone(),
            config.queue.cleanup_older_than_days,
        )
        .await?;
        scheduler.register_default_tasks().await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Interval scheduler disabled; relying on the HTTP trigger");
        None
    };

    // ── Step 6: HTTP server ──────────────────────────────────────
    let app = build_app(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("PitchForge server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 7: Stop background work ─────────────────────────────
    if let Some(scheduler) = scheduler.as_mut() {
        let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
        match tokio::time::timeout(grace, scheduler.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Scheduler shutdown failed: {}", e),
            Err(_) => tracing::warn!("Scheduler did not stop within {:?}", grace),
        }
    }
    offload.shutdown();

    tracing::info!("PitchForge server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
