//! HTTP request handlers
//!
//! Thin adapters from JSON requests to engine commands. Engine errors map to
//! `InvalidParameter` → 400, `NotFound` → 404, anything else → 500, each
//! with a `{ "status": "error: ..." }` body.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::model::{ArrangementSection, MuteSection};
use crate::playback::EngineSnapshot;
use crate::session::SongManifest;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rehearsal_common::PlaybackState;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
    uptime_secs: i64,
    sse_clients: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    position: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position: f64,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    target: f64,
    /// Fade window; the configured skip fade when absent
    fade_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    started: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    speed: f64,
}

#[derive(Debug, Deserialize)]
pub struct PitchRequest {
    semitones: i32,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    song_id: Option<Uuid>,
    position: f64,
    state: PlaybackState,
}

#[derive(Debug, Deserialize)]
pub struct ArrangementRequest {
    sections: Vec<ArrangementSection>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    index: usize,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoopRequest {
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct MutedRequest {
    muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SoloRequest {
    solo: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: f32,
}

#[derive(Debug, Deserialize)]
pub struct PanRequest {
    pan: f32,
}

#[derive(Debug, Deserialize)]
pub struct PitchExemptRequest {
    pitch_exempt: bool,
}

#[derive(Debug, Deserialize)]
pub struct MuteSectionsRequest {
    sections: Vec<MuteSection>,
}

#[derive(Debug, Serialize)]
pub struct SectionMuteResponse {
    index: usize,
    muted: bool,
}

#[derive(Debug, Serialize)]
pub struct AudibilityResponse {
    track_id: Uuid,
    audible: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    visible: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadSongResponse {
    status: String,
    song_id: Uuid,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::InvalidParameter(_) | Error::Session(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!("Command failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "rehearsal-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        uptime_secs: ctx.state.uptime_secs(),
        sse_clients: ctx.state.sse_client_count(),
    })
}

// ============================================================================
// Song
// ============================================================================

/// POST /song - Load a song (manifest form), replacing the current one
pub async fn load_song(
    State(ctx): State<AppContext>,
    Json(manifest): Json<SongManifest>,
) -> ApiResult<Json<LoadSongResponse>> {
    let song = manifest.into_song().map_err(api_error)?;
    let song_id = song.id;
    info!("Load song '{}' requested", song.title);
    ctx.engine.load_song(song).await.map_err(api_error)?;
    Ok(Json(LoadSongResponse {
        status: "ok".to_string(),
        song_id,
    }))
}

/// POST /song/unload
pub async fn unload_song(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    ctx.engine.unload_song().await.map_err(api_error)?;
    Ok(ok())
}

// ============================================================================
// Transport
// ============================================================================

/// GET /playback/state - Full engine snapshot
pub async fn get_state(State(ctx): State<AppContext>) -> Json<EngineSnapshot> {
    Json(ctx.engine.snapshot().await)
}

/// GET /playback/position
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionResponse> {
    Json(PositionResponse {
        song_id: ctx.engine.song_id().await,
        position: ctx.engine.position().await,
        state: ctx.engine.state().await,
    })
}

/// POST /playback/play - Body optional: `{ "position": 12.5 }`
pub async fn play(
    State(ctx): State<AppContext>,
    request: Option<Json<PlayRequest>>,
) -> ApiResult<Json<StatusResponse>> {
    let position = request.and_then(|Json(r)| r.position);
    info!("Play command received");
    ctx.engine.play(position).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    info!("Pause command received");
    ctx.engine.pause().await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    info!("Stop command received");
    ctx.engine.stop().await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine.seek(request.position).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/skip - Faded jump; `started` is false when refused
pub async fn skip(
    State(ctx): State<AppContext>,
    Json(request): Json<SkipRequest>,
) -> ApiResult<Json<SkipResponse>> {
    let fade_secs = request
        .fade_ms
        .map(|ms| ms as f64 / 1000.0)
        .unwrap_or_else(|| ctx.engine.config().skip_fade_secs());
    let started = ctx
        .engine
        .skip_to_position(request.target, fade_secs)
        .await
        .map_err(api_error)?;
    Ok(Json(SkipResponse { started }))
}

/// POST /playback/speed
pub async fn set_speed(
    State(ctx): State<AppContext>,
    Json(request): Json<SpeedRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine.set_speed(request.speed).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/pitch
pub async fn set_pitch(
    State(ctx): State<AppContext>,
    Json(request): Json<PitchRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_pitch(request.semitones)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

// ============================================================================
// Arrangement and loop
// ============================================================================

/// PUT /arrangement
pub async fn set_arrangement(
    State(ctx): State<AppContext>,
    Json(request): Json<ArrangementRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_arrangement(request.sections)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /arrangement/:index/toggle
pub async fn toggle_arrangement_section(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<Json<ToggleResponse>> {
    let enabled = ctx
        .engine
        .toggle_arrangement_section(index)
        .await
        .map_err(api_error)?;
    Ok(Json(ToggleResponse { index, enabled }))
}

/// POST /loop - Set bounds and enable
pub async fn set_loop(
    State(ctx): State<AppContext>,
    Json(request): Json<LoopRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_loop(request.start, request.end)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /loop/enabled
pub async fn set_loop_enabled(
    State(ctx): State<AppContext>,
    Json(request): Json<EnabledRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_loop_enabled(request.enabled)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// DELETE /loop
pub async fn clear_loop(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    ctx.engine.clear_loop().await.map_err(api_error)?;
    Ok(ok())
}

// ============================================================================
// Tracks
// ============================================================================

/// DELETE /tracks/:track_id - Detach a track from the loaded song
pub async fn remove_track(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine.remove_track(track_id).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/mute
pub async fn set_track_muted(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<MutedRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_track_muted(track_id, request.muted)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/solo
pub async fn set_track_solo(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<SoloRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_track_solo(track_id, request.solo)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/volume
pub async fn set_track_volume(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_track_volume(track_id, request.volume)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/pan
pub async fn set_track_pan(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<PanRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_track_pan(track_id, request.pan)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/pitch_exempt
pub async fn set_track_pitch_exempt(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<PitchExemptRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_track_pitch_exempt(track_id, request.pitch_exempt)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// GET /tracks/:track_id/audible
pub async fn get_track_audibility(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<Json<AudibilityResponse>> {
    let audible = ctx
        .engine
        .track_audibility(track_id)
        .await
        .map_err(api_error)?;
    Ok(Json(AudibilityResponse { track_id, audible }))
}

/// PUT /tracks/:track_id/mute_sections
pub async fn set_mute_sections(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<MuteSectionsRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_mute_sections(track_id, request.sections)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /tracks/:track_id/mute_sections/:index/toggle
pub async fn toggle_section_mute(
    State(ctx): State<AppContext>,
    Path((track_id, index)): Path<(Uuid, usize)>,
) -> ApiResult<Json<SectionMuteResponse>> {
    let muted = ctx
        .engine
        .toggle_section_mute(track_id, index)
        .await
        .map_err(api_error)?;
    Ok(Json(SectionMuteResponse { index, muted }))
}

// ============================================================================
// Host
// ============================================================================

/// POST /visibility - Host foreground/background notification
pub async fn set_visibility(
    State(ctx): State<AppContext>,
    Json(request): Json<VisibilityRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.engine
        .set_visibility(request.visible)
        .await
        .map_err(api_error)?;
    Ok(ok())
}
