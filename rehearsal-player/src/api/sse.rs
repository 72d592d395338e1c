//! Server-Sent Events (SSE) broadcaster
//!
//! Streams engine events to connected clients. Each client gets its own
//! broadcast subscription; a lagging client skips events rather than
//! slowing the engine.

use crate::api::server::AppContext;
use crate::state::SharedState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Decrements the client count when the stream is dropped
struct ClientGuard(Arc<SharedState>);

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let remaining = self.0.sse_client_disconnected();
        debug!("SSE client disconnected ({} remaining)", remaining);
    }
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let clients = ctx.state.sse_client_connected();
    debug!("New SSE client connected ({} total)", clients);

    let guard = ClientGuard(Arc::clone(&ctx.state));
    let rx = ctx.state.subscribe_events();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        // Keep the guard alive for as long as the stream
        let _guard = &guard;
        let item = match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                // Lagged: the client missed events
                warn!("SSE stream error: {:?}", e);
                None
            }
        };
        async move { item }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
