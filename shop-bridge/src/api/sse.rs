use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::{
    api::handlers::AppState,
    events::{BridgeEvent, EventReceiver},
};

fn event_name(event: &BridgeEvent) -> &'static str {
    match event {
        BridgeEvent::SessionStored { .. } => "session_stored",
        BridgeEvent::SessionsPurged { .. } => "sessions_purged",
        BridgeEvent::WebhookHandled { .. } => "webhook_handled",
        BridgeEvent::WebhookDuplicate { .. } => "webhook_duplicate",
        BridgeEvent::WebhookIgnored { .. } => "webhook_ignored",
        BridgeEvent::ComplianceFailure { .. } => "compliance_failure",
    }
}

fn event_stream(receiver: EventReceiver) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(receiver).map(|item| match item {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Ok(Event::default().event(event_name(&event)).data(json)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                Ok(Event::default().event("error").data("serialization_error"))
            }
        },
        // Slow consumer skipped events; tell it rather than dropping silently
        Err(BroadcastStreamRecvError::Lagged(_)) => {
            Ok(Event::default().event("system").data("lagged"))
        }
    })
}

/// Operator stream of every event on the bus.
pub async fn global_events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Operator connected to global event stream");
    Sse::new(event_stream(state.event_bus.subscribe_global())).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Events scoped to one shop.
pub async fn shop_events_stream(
    State(state): State<AppState>,
    Path(shop): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(shop = %shop, "Operator connected to shop event stream");
    Sse::new(event_stream(state.event_bus.subscribe_shop(&shop))).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
