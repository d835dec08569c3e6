//! HTTP API handlers

use crate::bus::{BusEvent, SharedBus};
use crate::monitor::{MonitorService, MonitorStatus};
use crate::radio::RadioController;
use crate::spotify::{SpotifyAuth, SpotifyError};
use crate::store::{ChannelStore, CommandStore};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<SpotifyAuth>,
    pub radio: Arc<RadioController>,
    pub monitor: MonitorService,
    pub channels: ChannelStore,
    pub commands: CommandStore,
    pub bus: SharedBus,
}

impl AppState {
    pub fn new(
        auth: Arc<SpotifyAuth>,
        radio: Arc<RadioController>,
        monitor: MonitorService,
        channels: ChannelStore,
        commands: CommandStore,
        bus: SharedBus,
    ) -> Self {
        Self {
            auth,
            radio,
            monitor,
            channels,
            commands,
            bus,
        }
    }
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Map a failed playback call: 401 when logged out, 502 for upstream errors
fn playback_error(e: anyhow::Error) -> Response {
    let status = match e.downcast_ref::<SpotifyError>() {
        Some(SpotifyError::NotAuthenticated) => StatusCode::UNAUTHORIZED,
        Some(SpotifyError::NotConfigured(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::warn!("Playback request failed: {:#}", e);
    error_response(status, format!("{:#}", e))
}

/// General status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub git_sha: &'static str,
    pub authenticated: bool,
    pub channels: usize,
    pub current_channel: usize,
    pub command_pending: bool,
    pub monitor: MonitorStatus,
    pub bus_subscribers: usize,
}

/// GET /status - Service health check
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: "radio-control",
        version: crate::VERSION,
        git_sha: crate::GIT_SHA,
        authenticated: state.auth.is_authenticated().await,
        channels: state.channels.load().len(),
        current_channel: state.radio.current_channel().await,
        command_pending: state.commands.is_pending(),
        monitor: state.monitor.status().await,
        bus_subscribers: state.bus.subscriber_count(),
    })
}

// =============================================================================
// Login
// =============================================================================

/// GET / - Playlists when logged in, login otherwise
pub async fn index_handler(State(state): State<AppState>) -> Redirect {
    if state.auth.is_authenticated().await {
        Redirect::to("/playlists")
    } else {
        Redirect::to("/login")
    }
}

/// GET /login - Redirect to the Spotify authorize page
pub async fn login_handler(State(state): State<AppState>) -> Response {
    match state.auth.authorize_url().await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /callback - OAuth redirect target
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        return error_response(StatusCode::BAD_REQUEST, format!("Login denied: {}", error));
    }
    let Some(code) = query.code else {
        return error_response(StatusCode::BAD_REQUEST, "Missing authorization code");
    };

    match state.auth.exchange_code(&code, query.state.as_deref()).await {
        Ok(()) => {
            state.bus.publish(BusEvent::AuthChanged {
                authenticated: true,
            });
            Redirect::to("/playlists").into_response()
        }
        Err(e @ SpotifyError::InvalidState) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            tracing::warn!("Token exchange failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

// =============================================================================
// Playlists
// =============================================================================

#[derive(Deserialize)]
pub struct SetPlaylistsRequest {
    #[serde(default)]
    pub playlists: Vec<String>,
}

/// POST /set_playlists - Replace the channel list
pub async fn set_playlists_handler(
    State(state): State<AppState>,
    Json(req): Json<SetPlaylistsRequest>,
) -> Response {
    let playlists: Vec<String> = req
        .playlists
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if playlists.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No playlists provided");
    }

    if let Err(e) = state.channels.save(&playlists) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
    }
    state.bus.publish(BusEvent::PlaylistsUpdated {
        count: playlists.len(),
    });

    (
        StatusCode::OK,
        Json(json!({
            "message": "Playlists saved successfully",
            "playlists": playlists,
        })),
    )
        .into_response()
}

/// GET /get_playlists - Current channel list
pub async fn get_playlists_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "playlists": state.channels.load() }))
}

// =============================================================================
// Pending command
// =============================================================================

#[derive(Deserialize)]
pub struct SetCommandRequest {
    #[serde(default)]
    pub command: Option<String>,
}

/// POST /set_command - Queue the one-shot command
pub async fn set_command_handler(
    State(state): State<AppState>,
    Json(req): Json<SetCommandRequest>,
) -> Response {
    let command = req.command.as_deref().map(str::trim).unwrap_or_default();
    if command.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No command provided");
    }

    if let Err(e) = state.commands.set(command) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
    }
    state.bus.publish(BusEvent::CommandQueued {
        command: command.to_string(),
    });

    (
        StatusCode::OK,
        Json(json!({
            "message": "Command saved successfully",
            "command": command,
        })),
    )
        .into_response()
}

/// GET /get_command - Pending command or null
pub async fn get_command_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "command": state.commands.load() }))
}

/// DELETE /command - Drop the pending command
pub async fn clear_command_handler(State(state): State<AppState>) -> Response {
    match state.commands.clear() {
        Ok(()) => {
            state.bus.publish(BusEvent::CommandCleared);
            (StatusCode::OK, Json(json!({"message": "Command cleared"}))).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

// =============================================================================
// Playback control
// =============================================================================

#[derive(Deserialize)]
pub struct PlayRequest {
    pub playlist_uri: String,
}

/// POST /play - Start a playlist on the first device
pub async fn play_handler(
    State(state): State<AppState>,
    Json(req): Json<PlayRequest>,
) -> Response {
    let uri = req.playlist_uri.trim();
    if uri.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No playlist provided");
    }
    match state.radio.play_uri(uri).await {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true, "playlist_uri": uri}))).into_response(),
        Err(e) => playback_error(e),
    }
}

/// POST /pause - Pause playback
pub async fn pause_handler(State(state): State<AppState>) -> Response {
    match state.radio.pause().await {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(e) => playback_error(e),
    }
}

/// POST /zap - Next channel
pub async fn zap_handler(State(state): State<AppState>) -> Response {
    match state.radio.zap_next().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"ok": true, "channel": state.radio.current_channel().await})),
        )
            .into_response(),
        Err(e) => playback_error(e),
    }
}

// =============================================================================
// SSE Events
// =============================================================================

/// GET /events - Server-Sent Events stream
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => serde_json::to_string(&event)
            .ok()
            .map(|json| Ok(Event::default().data(json))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
