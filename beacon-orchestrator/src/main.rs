use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_client::{DiffsClient, HybridRouterClient, InferenceBackend};
use beacon_orchestrator::config::Config;
use beacon_orchestrator::service::recovery_service::RecoverySweeper;
use beacon_orchestrator::state::AppState;
use beacon_orchestrator::{api, db, worker};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Beacon Orchestrator...");

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    let catalog = config.load_catalog()?;
    let regions = config.worker_regions(&catalog)?;
    tracing::info!("Loaded region catalog with {} region(s)", catalog.len());

    let aggregation = Arc::new(
        DiffsClient::with_timeout(config.diffs_url.clone(), config.diffs_timeout())
            .context("Failed to build diffs client")?,
    );
    let inference: Arc<dyn InferenceBackend> = Arc::new(
        HybridRouterClient::with_timeout(config.inference_url.clone(), config.dispatch_timeout())
            .context("Failed to build inference client")?,
    );

    let state = if config.in_memory {
        tracing::warn!("Running with in-memory storage; state is lost on exit");
        AppState::in_memory(catalog, aggregation)
    } else {
        tracing::info!("Connecting to database...");

        let pool = db::create_pool(&config.database_url)
            .await
            .context("Failed to create database pool")?;

        tracing::info!("Database connection pool created");

        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        AppState::postgres(pool, catalog, aggregation)
    };
    let state = state
        .with_default_max_retries(config.default_max_retries)
        .with_aggregation_timeout(config.diffs_timeout());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background = worker::spawn_region_pools(
        &state,
        inference,
        &regions,
        &config.worker_settings(),
        &shutdown_rx,
    );
    tracing::info!("Started worker pools for: {}", regions.join(", "));

    let sweeper = RecoverySweeper::new(
        state.clone(),
        config.sweep_settings(),
        config.sweep_interval(),
    );
    background.push(tokio::spawn(sweeper.run(shutdown_rx)));

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!("Background task panicked: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
