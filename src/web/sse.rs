//! Server-Sent Events (SSE) handler

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tokio::time::{interval_at, Instant};

use super::AppState;
use crate::db::format_timestamp;

/// `GET /api/live`: one `data:` frame per ingested event, plus a heartbeat
/// frame every `live.heartbeat_secs`.
///
/// Dropping the response (client disconnect) unregisters the subscriber and
/// stops its heartbeat timer. The stream ends when the hub is closed.
pub async fn live_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.register();
    tracing::info!(
        subscriber = %subscription.id(),
        subscribers = state.hub.subscriber_count(),
        "Live stream opened"
    );

    let period = state.heartbeat;
    let ticker = interval_at(Instant::now() + period, period);

    let frames = stream::unfold((subscription, ticker), |(mut subscription, mut ticker)| async move {
        let event = tokio::select! {
            frame = subscription.recv() => Event::default().data(frame?),
            _ = ticker.tick() => heartbeat(),
        };
        Some((Ok::<_, Infallible>(event), (subscription, ticker)))
    });

    Sse::new(frames)
}

fn heartbeat() -> Event {
    Event::default().data(json!({ "heartbeat": format_timestamp(Utc::now()) }).to_string())
}
