//! SocialRank Engine
//!
//! Personalized content ranking service.
//!
//! # Architecture
//!
//! - **Ranking Engine**: In-memory metrics, personalized and trending feeds
//! - **Background Tasks**: Metric refresh, optimizer sweeps, snapshot saves
//! - **API Server**: REST endpoints for collaborators
//!
//! # Graceful Shutdown
//!
//! On SIGTERM or SIGINT the engine stops the background tickers, drains the
//! API server and writes one final snapshot.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use socialrank::{api, scheduler, Config, RankingEngine, SnapshotStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("SocialRank Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;
    info!("Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus exporter installed");
    }

    // Build the engine and restore the last snapshot
    let engine = Arc::new(RankingEngine::new(config.engine.clone()));
    let snapshots = SnapshotStore::from_config(&config.persistence);
    let outcome = snapshots.load(&engine).await;
    info!(?outcome, "Startup state ready");

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Spawn all services
    let mut handles = scheduler::spawn_background_tasks(
        engine.clone(),
        snapshots.clone(),
        &config.scheduler,
        &shutdown_tx,
    );
    info!("Background tasks started (refresh, optimize, persist)");

    info!("Starting API server on port {}...", config.api.port);
    handles.push(spawn_api_server(engine.clone(), &config, &shutdown_tx));

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("A service failed, initiating shutdown");
        }
    }

    // Signal all services to stop
    let _ = shutdown_tx.send(());

    // Wait for services to finish with timeout
    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("Shutdown timeout exceeded, forcing exit");
    }

    // Final snapshot
    if let Err(e) = snapshots.save(&engine).await {
        error!("Final snapshot failed: {:?}", e);
    }

    info!("SocialRank Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("socialrank=debug,socialrank_engine=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

/// Spawn the API server
fn spawn_api_server(
    engine: Arc<RankingEngine>,
    config: &Config,
    shutdown: &broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let api_config = config.api.clone();
    let mut shutdown_rx = shutdown.subscribe();

    tokio::spawn(async move {
        let stop = async move {
            let _ = shutdown_rx.recv().await;
            info!("API server shutting down");
        };
        if let Err(e) = api::start_server(engine, &api_config, stop).await {
            error!("API server error: {:?}", e);
        }
    })
}

/// Wait for any task to fail
async fn wait_for_any_failure(handles: &mut [tokio::task::JoinHandle<()>]) {
    loop {
        if handles.iter().any(|h| h.is_finished()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
