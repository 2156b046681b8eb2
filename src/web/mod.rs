//! Web server module

mod error;
mod routes;
mod sse;


use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::alerts::AlertRules;
use crate::config::{Config, QueryConfig};
use crate::db::Database;
use crate::events::LiveHub;

const DASHBOARD_TEMPLATE: &str = include_str!("../../static/index.html");
const API_BASE_PLACEHOLDER: &str = "__API_BASE__";

pub struct AppState {
    pub db: Database,
    pub hub: LiveHub,
    pub alerts: AlertRules,
    pub query: QueryConfig,
    pub heartbeat: Duration,
    pub dashboard_html: String,
}

impl AppState {
    pub fn new(config: &Config, db: Database) -> Self {
        // JSON string literal so the base URL is safe to drop into the page script
        // JSON string literal inside an inline <script>; `</` must not close the tag
        let api_base = serde_json::Value::String(config.dashboard.api_base.clone())
            .to_string()
            .replace("</", "<\\/");

        Self {
            db,
            hub: LiveHub::new(config.live.subscriber_buffer),
            alerts: AlertRules::new(),
            query: config.query.clone(),
            heartbeat: Duration::from_secs(config.live.heartbeat_secs),
            dashboard_html: DASHBOARD_TEMPLATE.replace(API_BASE_PLACEHOLDER, &api_base),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/events", get(routes::list_events).post(routes::create_event))
        .route("/overview", get(routes::overview))
        .route("/live", get(sse::live_handler))
        .route("/alerts", get(routes::list_alerts).post(routes::create_alert))
        .route("/demo", post(routes::create_demo_event));

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let hub = state.hub.clone();
    let app = router(state);

    let addr = config.bind_addr();
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Live streams never finish on their own
            hub.close();
        })
        .await?;

    info!("Web server stopped");
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
