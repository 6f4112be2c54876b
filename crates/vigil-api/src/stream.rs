//! Server-sent events relay of live-dashboard broadcasts.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use vigil_notify::BroadcastMessage;

use crate::ApiState;

/// GET /api/v1/stream
pub async fn live_stream(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub.subscribe();
    debug!(subscribers = state.hub.subscriber_count(), "stream client connected");

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => return Some((Ok(to_event(&message)), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream client lagging, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// One SSE frame: the broadcast name as the event type, the payload as JSON.
pub fn to_event(message: &BroadcastMessage) -> Event {
    let data = serde_json::to_string(&message.data).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(&message.event).data(data)
}

