//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with routes for control endpoints and SSE.

use crate::error::{Error, Result};
use crate::playback::PlaybackEngine;
use crate::state::SharedState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub engine: PlaybackEngine,
}

/// Build the router with every control route
pub fn create_router(ctx: AppContext) -> Router {
    use super::handlers as h;

    Router::new()
        .route("/health", get(h::health))
        // Song
        .route("/song", post(h::load_song))
        .route("/song/unload", post(h::unload_song))
        // Transport
        .route("/playback/state", get(h::get_state))
        .route("/playback/position", get(h::get_position))
        .route("/playback/play", post(h::play))
        .route("/playback/pause", post(h::pause))
        .route("/playback/stop", post(h::stop))
        .route("/playback/seek", post(h::seek))
        .route("/playback/skip", post(h::skip))
        .route("/playback/speed", post(h::set_speed))
        .route("/playback/pitch", post(h::set_pitch))
        // Arrangement and loop
        .route("/arrangement", put(h::set_arrangement))
        .route("/arrangement/:index/toggle", post(h::toggle_arrangement_section))
        .route("/loop", post(h::set_loop).delete(h::clear_loop))
        .route("/loop/enabled", post(h::set_loop_enabled))
        // Tracks
        .route("/tracks/:track_id", delete(h::remove_track))
        .route("/tracks/:track_id/mute", post(h::set_track_muted))
        .route("/tracks/:track_id/solo", post(h::set_track_solo))
        .route("/tracks/:track_id/volume", post(h::set_track_volume))
        .route("/tracks/:track_id/pan", post(h::set_track_pan))
        .route("/tracks/:track_id/pitch_exempt", post(h::set_track_pitch_exempt))
        .route("/tracks/:track_id/audible", get(h::get_track_audibility))
        .route("/tracks/:track_id/mute_sections", put(h::set_mute_sections))
        .route(
            "/tracks/:track_id/mute_sections/:index/toggle",
            post(h::toggle_section_mute),
        )
        // Host
        .route("/visibility", post(h::set_visibility))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local UI clients
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
