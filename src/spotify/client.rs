//! Spotify Web API remote-control client

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::auth::SpotifyAuth;
use super::types::{ApiErrorBody, CurrentPlayback, Device, DevicesResponse, Paging, Playlist};
use super::SpotifyError;
use crate::monitor::{PlaybackSample, PlaybackSource};

pub struct SpotifyClient {
    http: Client,
    auth: Arc<SpotifyAuth>,
    api_base_url: String,
}

impl SpotifyClient {
    pub fn new(auth: Arc<SpotifyAuth>, api_base_url: impl Into<String>) -> Self {
        #[allow(clippy::expect_used)] // HTTP client creation only fails if TLS setup fails
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            auth,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn auth(&self) -> &Arc<SpotifyAuth> {
        &self.auth
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, SpotifyError> {
        let mut url = Url::parse(&format!("{}{}", self.api_base_url, path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send an authenticated request; non-2xx statuses become `SpotifyError::Api`
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Response, SpotifyError> {
        let token = self.auth.access_token().await?;
        let url = self.url(path, query)?;

        debug!(method = %method, path, "Spotify request");

        let request = self.http.request(method, url).bearer_auth(token);
        let request = match body {
            Some(body) => request.json(&body),
            // Player endpoints reject bodiless PUTs without a length
            None => request.body(Vec::new()),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        Err(SpotifyError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// `GET /me/player`; `None` when nothing is playing on any device
    pub async fn current_playback(&self) -> Result<Option<CurrentPlayback>, SpotifyError> {
        let response = self.send(Method::GET, "/me/player", &[], None).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn pause(&self) -> Result<(), SpotifyError> {
        self.send(Method::PUT, "/me/player/pause", &[], None).await?;
        Ok(())
    }

    /// Resume whatever was playing on the active device
    pub async fn resume(&self) -> Result<(), SpotifyError> {
        self.send(Method::PUT, "/me/player/play", &[], None).await?;
        Ok(())
    }

    /// Start a playlist (or album/artist) context on a device
    pub async fn start_playback(
        &self,
        device_id: Option<&str>,
        context_uri: &str,
    ) -> Result<(), SpotifyError> {
        let query: Vec<(&str, &str)> = device_id.map(|id| ("device_id", id)).into_iter().collect();
        self.send(
            Method::PUT,
            "/me/player/play",
            &query,
            Some(json!({ "context_uri": context_uri })),
        )
        .await?;
        Ok(())
    }

    pub async fn set_shuffle(&self, state: bool, device_id: Option<&str>) -> Result<(), SpotifyError> {
        let state = if state { "true" } else { "false" };
        let mut query = vec![("state", state)];
        if let Some(id) = device_id {
            query.push(("device_id", id));
        }
        self.send(Method::PUT, "/me/player/shuffle", &query, None)
            .await?;
        Ok(())
    }

    pub async fn devices(&self) -> Result<Vec<Device>, SpotifyError> {
        let response = self
            .send(Method::GET, "/me/player/devices", &[], None)
            .await?;
        let devices: DevicesResponse = response.json().await?;
        Ok(devices.devices)
    }

    /// First page of the current user's playlists
    pub async fn current_user_playlists(&self, limit: u32) -> Result<Vec<Playlist>, SpotifyError> {
        let limit = limit.clamp(1, 50).to_string();
        let response = self
            .send(Method::GET, "/me/playlists", &[("limit", &limit)], None)
            .await?;
        let page: Paging<Playlist> = response.json().await?;
        Ok(page.items)
    }
}

#[async_trait]
impl PlaybackSource for SpotifyClient {
    async fn current_sample(&self) -> anyhow::Result<Option<PlaybackSample>> {
        Ok(self
            .current_playback()
            .await?
            .and_then(|playback| playback.to_sample()))
    }
}
