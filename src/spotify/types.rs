//! Web API payloads (only the fields the radio reads)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::PlaybackSample;

/// Cached OAuth token (`token.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// True when the token expires within `margin_secs`
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at - Utc::now() <= Duration::seconds(margin_secs)
    }
}

/// Response of `POST /api/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Convert into a cacheable token. Refresh responses may omit the refresh
    /// token, in which case the previous one stays valid.
    pub fn into_token(self, previous_refresh: Option<String>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            scope: self.scope,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// Currently playing track (or episode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackContext {
    #[serde(rename = "type", default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub volume_percent: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Response of `GET /me/player`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPlayback {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<PlaybackItem>,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub context: Option<PlaybackContext>,
    #[serde(default)]
    pub shuffle_state: Option<bool>,
}

impl CurrentPlayback {
    /// Monitor input; `None` when nothing identifiable is playing (ads, local gaps)
    pub fn to_sample(&self) -> Option<PlaybackSample> {
        let item = self.item.as_ref()?;
        let track_id = item.id.clone().or_else(|| item.uri.clone())?;
        Some(PlaybackSample {
            track_id,
            progress_ms: self.progress_ms.unwrap_or(0),
            duration_ms: item.duration_ms,
            is_playing: self.is_playing,
            title: self.describe(),
        })
    }

    /// "Title - Artist" for logs and the display
    pub fn describe(&self) -> Option<String> {
        let item = self.item.as_ref()?;
        let artists = item
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if artists.is_empty() {
            Some(item.name.clone())
        } else {
            Some(format!("{} - {}", item.name, artists))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistOwner {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTracks {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub owner: Option<PlaylistOwner>,
    #[serde(default)]
    pub tracks: Option<PlaylistTracks>,
}

/// Paged list response
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub next: Option<String>,
}

/// Error envelope: `{"error": {"status": 403, "message": "..."}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
}
