//! Phase staking webhook service.
//!
//! Main entry point. Initializes storage, the delivery engine, and the
//! HTTP API, and coordinates graceful startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use phase_api::{AppState, Config};
use phase_core::{PostgresStore, RealClock, Registry, WebhookStore};
use phase_delivery::DeliveryEngine;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Phase webhook service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        workers = config.worker_pool_size,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    let store = PostgresStore::new(Arc::new(db_pool.clone()));
    store.run_migrations().await.context("Failed to run migrations")?;
    info!("Database migrations completed");

    let store: Arc<dyn WebhookStore> = Arc::new(store);
    let clock = Arc::new(RealClock::new());
    let registry = Arc::new(Registry::new(store.clone(), clock.clone()));

    // Start the delivery worker pool.
    let mut engine = DeliveryEngine::new(store.clone(), config.to_delivery_config(), clock)
        .context("Failed to initialize delivery engine")?;
    engine.start().await.context("Failed to start delivery engine")?;

    // Start the HTTP API.
    let addr = config.parse_server_addr()?;
    let state = AppState::new(store, registry);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = phase_api::start_server(state, addr).await {
            error!(error = %e, "Server failed");
        }
    });

    info!(addr = %addr, "Phase webhook service is ready");

    // The server task exits when it receives a shutdown signal; the
    // engine then drains in-flight deliveries before the pool closes.
    if let Err(e) = server_handle.await {
        error!(error = %e, "Server task panicked");
    }

    info!("Shutting down delivery engine");
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "Delivery engine shutdown failed");
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("Phase webhook service shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,phase=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
