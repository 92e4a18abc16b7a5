use anyhow::{Context, Result};
use domain::ports::Stores;
use persistence::PgStore;
use std::sync::Arc;
use tracing::info;

use cribble_api::{app, config::Config, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("loading configuration")?;
    middleware::logging::init_logging(&config.logging);

    info!("Starting Cribble API v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig::from(&config.database);
    let pool = persistence::db::create_pool(&db_config)
        .await
        .context("connecting to the database")?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool)
        .await
        .context("running migrations")?;
    info!("Migrations completed");

    let addr = config.socket_addr().context("invalid server.host/server.port")?;
    let stores = Stores::from_backend(Arc::new(PgStore::new(pool.clone())));
    let app = app::create_app(config, stores, Some(pool));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
