//! SSE Gateway (§4.8): `GET /debates/{id}/events`.
//!
//! Grounded on the chat API's `make_sse_stream` pattern, generalized from a
//! single-shot turn stream to a long-lived, resumable conversation stream:
//! a `Last-Event-ID` header replays the client's backlog from the event
//! bus's ring buffer before switching to the live broadcast feed, and an
//! idle connection gets a `:\n\n` comment every 15s so proxies don't time
//! it out.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use uuid::Uuid;

use parley_domain::event::Event as DomainEvent;

use crate::runtime::EventBus;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn to_sse_event(event: &DomainEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.sequence.to_string())
        .event(event.kind.name())
        .data(data)
}

pub async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if state.store.get_conversation(id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "debate not found" })),
        ));
    }

    let bus = state.event_buses.get_or_create(id);
    let resume_from = last_event_id(&headers);

    let stream = make_sse_stream(bus, resume_from);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL)))
}

fn make_sse_stream(
    bus: std::sync::Arc<EventBus>,
    resume_from: Option<u64>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let mut live_rx = bus.subscribe();

        match resume_from {
            Some(cursor) => match bus.replay_after(cursor) {
                Some(backlog) => {
                    for event in &backlog {
                        yield Ok(to_sse_event(event));
                    }
                }
                None => {
                    // Client's cursor fell off the back of the ring — it missed
                    // events we can no longer replay individually.
                    yield Ok(Event::default()
                        .event("lifecycle.resync")
                        .data(r#"{"type":"lifecycle.resync"}"#));
                }
            },
            None => {}
        }

        loop {
            match live_rx.recv().await {
                Ok(event) => yield Ok(to_sse_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    yield Ok(Event::default()
                        .event("lifecycle.resync")
                        .data(r#"{"type":"lifecycle.resync"}"#));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
