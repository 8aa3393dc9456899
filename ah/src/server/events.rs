//! `GET /api/events` - server-sent stream of new requests

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use super::AppState;

/// SSE event name for a freshly created request
pub const NEW_REQUEST_EVENT: &str = "new-request";

/// One broker subscription per connected observer, released when the client goes away
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broker.subscribe();
    debug!(subscriber_id = subscription.id(), "events: observer connected");

    let greeting = stream::once(async { Ok::<_, Infallible>(Event::default().comment("keepalive")) });
    let updates = stream::unfold(subscription, |mut subscription| async move {
        let payload = subscription.recv().await?;
        let event = Event::default().event(NEW_REQUEST_EVENT).data(payload);
        Some((Ok(event), subscription))
    });

    Sse::new(greeting.chain(updates)).keep_alive(KeepAlive::new().interval(state.keepalive).text("keepalive"))
}
