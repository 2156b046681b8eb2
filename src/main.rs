//! Traffic Monitor - network traffic event logger with a live dashboard
//!
//! Accepts JSON traffic events over HTTP and:
//! - Persists them to SQLite (flattened columns plus the raw payload)
//! - Serves filtered queries and aggregate overviews
//! - Streams newly ingested events to browsers over SSE

mod alerts;
mod config;
mod db;
mod demo;
mod events;
mod web;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Traffic Monitor v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded");

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!(path = %config.database.path, "Database initialized");

    let state = Arc::new(web::AppState::new(&config, db.clone()));

    web::start_server(&config, state).await?;

    db.close().await;
    Ok(())
}
