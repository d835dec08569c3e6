//! Mock Spotify Web API + accounts service for testing
//!
//! Serves the player endpoints under `/v1` and the token endpoint at
//! `/api/token`. Requests must carry one of the issued bearer tokens.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const INITIAL_TOKEN: &str = "initial-token";
pub const REFRESHED_TOKEN: &str = "refreshed-token";
pub const CODE_TOKEN: &str = "code-token";

/// Mock playback state
#[derive(Debug, Clone)]
pub struct MockPlayback {
    pub track_id: String,
    pub name: String,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub context_uri: Option<String>,
}

impl MockPlayback {
    pub fn new(track_id: &str, progress_ms: u64, duration_ms: u64) -> Self {
        Self {
            track_id: track_id.to_string(),
            name: format!("Track {}", track_id),
            progress_ms,
            duration_ms,
            is_playing: true,
            context_uri: None,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "is_playing": self.is_playing,
            "progress_ms": self.progress_ms,
            "shuffle_state": true,
            "context": self.context_uri.as_ref().map(|uri| json!({"type": "playlist", "uri": uri})),
            "device": {"id": "dev-1", "name": "Kitchen", "type": "Speaker", "is_active": true},
            "item": {
                "id": self.track_id,
                "uri": format!("spotify:track:{}", self.track_id),
                "name": self.name,
                "duration_ms": self.duration_ms,
                "artists": [{"name": "Mock Artist"}]
            }
        })
    }
}

/// One request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

struct MockSpotifyState {
    playback: Option<MockPlayback>,
    devices: Vec<Value>,
    playlists: Vec<Value>,
    /// Remaining 403 responses for `PUT /me/player/play`
    forbidden_plays: u32,
    /// Player endpoints answer 503 while this is set
    unavailable: bool,
    valid_tokens: HashSet<String>,
    token_requests: Vec<HashMap<String, String>>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<RwLock<MockSpotifyState>>;

/// Mock Spotify server
pub struct MockSpotifyServer {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockSpotifyServer {
    /// Start a mock server on a random port
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockSpotifyState {
            playback: None,
            devices: vec![json!({
                "id": "dev-1",
                "name": "Kitchen",
                "type": "Speaker",
                "is_active": true,
                "volume_percent": 40
            })],
            playlists: Vec::new(),
            forbidden_plays: 0,
            unavailable: false,
            valid_tokens: HashSet::from([INITIAL_TOKEN.to_string()]),
            token_requests: Vec::new(),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/v1/me/player", get(handle_player))
            .route("/v1/me/player/pause", put(handle_pause))
            .route("/v1/me/player/play", put(handle_play))
            .route("/v1/me/player/shuffle", put(handle_shuffle))
            .route("/v1/me/player/devices", get(handle_devices))
            .route("/v1/me/playlists", get(handle_playlists))
            .route("/api/token", post(handle_token))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL of the accounts service
    pub fn accounts_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL of the Web API
    pub fn api_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub async fn set_playback(&self, playback: Option<MockPlayback>) {
        self.state.write().await.playback = playback;
    }

    pub async fn playback(&self) -> Option<MockPlayback> {
        self.state.read().await.playback.clone()
    }

    pub async fn set_devices(&self, devices: Vec<Value>) {
        self.state.write().await.devices = devices;
    }

    pub async fn add_playlist(&self, id: &str, name: &str) {
        self.state.write().await.playlists.push(json!({
            "id": id,
            "name": name,
            "uri": format!("spotify:playlist:{}", id),
            "owner": {"display_name": "me"},
            "tracks": {"total": 10}
        }));
    }

    /// Answer the next `n` playback starts with 403
    pub async fn forbid_next_plays(&self, n: u32) {
        self.state.write().await.forbidden_plays = n;
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.read().await.requests.clone()
    }

    /// Requests matching method + path
    pub async fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub async fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.read().await.token_requests.clone()
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"status": status.as_u16(), "message": message}})),
    )
        .into_response()
}

/// Record the request and check the bearer token
async fn record(
    state: &SharedState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    body: &Bytes,
) -> Result<(), Response> {
    let mut state = state.write().await;
    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        body: serde_json::from_slice(body).ok(),
    });

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if !state.valid_tokens.contains(token) {
        return Err(api_error(StatusCode::UNAUTHORIZED, "The access token expired"));
    }
    if state.unavailable {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable"));
    }
    Ok(())
}

async fn handle_player(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &Bytes::new()).await {
        return resp;
    }
    match &state.read().await.playback {
        Some(playback) => Json(playback.to_json()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_pause(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &body).await {
        return resp;
    }
    if let Some(playback) = state.write().await.playback.as_mut() {
        playback.is_playing = false;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_play(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &body).await {
        return resp;
    }

    let mut state = state.write().await;
    if state.forbidden_plays > 0 {
        state.forbidden_plays -= 1;
        return api_error(StatusCode::FORBIDDEN, "Player command failed: Restriction violated");
    }

    let context_uri = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("context_uri").and_then(Value::as_str).map(str::to_string));
    match context_uri {
        Some(context_uri) => {
            let mut playback = MockPlayback::new("first-track", 0, 200_000);
            playback.context_uri = Some(context_uri);
            state.playback = Some(playback);
        }
        None => match state.playback.as_mut() {
            Some(playback) => playback.is_playing = true,
            None => {
                return api_error(
                    StatusCode::NOT_FOUND,
                    "Player command failed: No active device found",
                )
            }
        },
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_shuffle(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &body).await {
        return resp;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_devices(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &Bytes::new()).await {
        return resp;
    }
    Json(json!({"devices": state.read().await.devices})).into_response()
}

async fn handle_playlists(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = record(&state, method, &uri, &headers, query, &Bytes::new()).await {
        return resp;
    }
    let state = state.read().await;
    Json(json!({
        "items": state.playlists,
        "total": state.playlists.len(),
        "next": null
    }))
    .into_response()
}

async fn handle_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.write().await;
    state.token_requests.push(form.clone());

    if headers.get("authorization").is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_client", "error_description": "Missing client credentials"})),
        )
            .into_response();
    }

    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            state.valid_tokens.insert(REFRESHED_TOKEN.to_string());
            Json(json!({
                "access_token": REFRESHED_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3600
            }))
            .into_response()
        }
        Some("authorization_code") => {
            state.valid_tokens.insert(CODE_TOKEN.to_string());
            Json(json!({
                "access_token": CODE_TOKEN,
                "token_type": "Bearer",
                "scope": "user-read-playback-state",
                "expires_in": 3600,
                "refresh_token": "code-refresh"
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        )
            .into_response(),
    }
}
