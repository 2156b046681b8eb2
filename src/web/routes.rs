//! HTTP routes for ingestion, queries, overview and alert rules

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Html,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;
use crate::db::{EventFilter, EventRow, NewEvent, Overview};
use crate::demo;

/// Serve the dashboard page
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.dashboard_html.clone())
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub id: i64,
}

/// Store one event and push it to live subscribers.
///
/// Publishing happens only after the insert succeeded and never fails the call.
async fn ingest(state: &AppState, body: Value) -> Result<(i64, Value), ApiError> {
    let event = NewEvent::from_json(body, Utc::now())?;
    let id = state.db.insert_event(&event).await?;

    let delivered = state.hub.publish(event.raw_json());
    tracing::info!(
        id,
        domain = event.domain.as_deref().unwrap_or("-"),
        source_ip = event.source_ip.as_deref().unwrap_or("-"),
        delivered,
        "Event ingested"
    );

    Ok((id, event.into_raw()))
}

/// `POST /api/events`
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(body) = body?;
    let (id, _) = ingest(&state, body).await?;
    Ok(Json(IngestResponse { ok: true, id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub q: Option<String>,
    pub limit: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RowsResponse {
    pub rows: Vec<EventRow>,
}

/// `GET /api/events?q=&limit=&from=&to=`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<RowsResponse>, ApiError> {
    let filter = EventFilter::from_params(
        query.q,
        query.limit.as_deref(),
        query.from.as_deref(),
        query.to.as_deref(),
        &state.query,
    )?;
    let rows = state.db.query_events(&filter).await?;
    Ok(Json(RowsResponse { rows }))
}

/// `GET /api/overview`
pub async fn overview(State(state): State<Arc<AppState>>) -> Result<Json<Overview>, ApiError> {
    Ok(Json(state.db.overview().await?))
}

#[derive(Debug, Serialize)]
pub struct DemoResponse {
    pub ok: bool,
    pub id: i64,
    pub event: Value,
}

/// `POST /api/demo`: synthesize one event and ingest it like any other
pub async fn create_demo_event(State(state): State<Arc<AppState>>) -> Result<Json<DemoResponse>, ApiError> {
    let body = demo::synthetic_event(&mut rand::thread_rng(), Utc::now());
    let (id, event) = ingest(&state, body).await?;
    Ok(Json(DemoResponse { ok: true, id, event }))
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub rules: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct AlertCreatedResponse {
    pub ok: bool,
    pub rule: Value,
}

/// `GET /api/alerts`
pub async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        rules: state.alerts.list().await,
    })
}

/// `POST /api/alerts`
pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AlertCreatedResponse>, ApiError> {
    let Json(rule) = body?;
    let rule = state.alerts.add(rule).await;
    Ok(Json(AlertCreatedResponse { ok: true, rule }))
}
