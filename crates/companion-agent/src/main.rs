//! Companion Agent - nearby points of interest on a companion device
//!
//! Runs the sync worker against a simulated primary device joined by an
//! in-memory link, and serves health, metrics and the current list over HTTP.

use anyhow::{Context, Result};
use companion_agent::{api, config::CompanionConfig};
use companion_lib::{
    health::HealthRegistry,
    observability::{SyncLogger, SyncMetrics},
    peer::{demo_pois, PrimaryResponder, StaticProvider},
    sync::{Presenter, RowBuffer, SyncHandle, SyncInbox, SyncWorker},
    transport::{MemoryLink, Session},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting companion-agent");

    // Load configuration
    let config = CompanionConfig::load()?;
    info!(
        node_name = %config.node_name,
        max_radius_km = config.max_radius_km,
        max_results = config.max_results,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_sync_components().await;

    let metrics = SyncMetrics::new();
    let logger = SyncLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let inbox = SyncInbox::new();
    let (_link, companion, primary) = MemoryLink::pair_into(inbox.sender());
    let companion_session = Arc::new(companion);
    let primary_session = Arc::new(primary.session);

    // Simulated primary device
    let responder = PrimaryResponder::new(
        primary_session.clone(),
        Arc::new(StaticProvider::new(demo_pois())),
    );
    let primary_handle = tokio::spawn(responder.run(primary.events, shutdown_tx.subscribe()));

    // Companion sync worker
    let presenter = Presenter::new(
        Box::new(RowBuffer::new()),
        Box::new(|| debug!("Complication timelines reloaded")),
    )
    .with_metrics(metrics);
    let (worker, sync) = SyncWorker::new(
        companion_session.clone(),
        inbox,
        Box::new(presenter),
        config.sync_config(),
    );
    let worker = worker
        .with_health(health_registry.clone())
        .with_logger(logger.clone());
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), sync.clone()));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    primary_session.activate();
    companion_session.activate();

    if let Some(interval) = config.refresh_interval() {
        tokio::spawn(periodic_refresh(sync, interval, shutdown_tx.subscribe()));
    }

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Wait for shutdown signal or for the API server to stop
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => warn!("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
            logger.log_shutdown("API server stopped");
        }
    }

    info!("Shutting down");
    if shutdown_tx.send(()).is_err() {
        debug!("No tasks left to notify");
    }
    worker_handle.await.context("Sync worker task failed")?;
    primary_handle.await.context("Primary responder task failed")?;
    api_handle.abort();

    Ok(())
}

/// Explicit refresh on a fixed interval, on top of the automatic triggers
async fn periodic_refresh(
    sync: SyncHandle,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; activation already triggers a refresh
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let attempt = sync.request_refresh();
                debug!(attempt = ?attempt, "Periodic refresh");
            }
            _ = shutdown.recv() => break,
        }
    }
}
