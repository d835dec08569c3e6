//! Spotify Web API integration
//!
//! Only the remote-control surface the radio needs:
//! - OAuth authorization-code flow with a cached, auto-refreshed token (`auth`)
//! - Playback state, pause/resume/start, shuffle, devices and playlists (`client`)

pub mod auth;
pub mod client;
pub mod types;

pub use auth::SpotifyAuth;
pub use client::SpotifyClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Spotify {0} is not configured")]
    NotConfigured(&'static str),

    #[error("not logged in to Spotify")]
    NotAuthenticated,

    #[error("OAuth state mismatch")]
    InvalidState,

    #[error("Spotify API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SpotifyError {
    /// HTTP 403 from the Web API (typically "player command failed: restriction violated")
    pub fn is_forbidden(&self) -> bool {
        matches!(self, SpotifyError::Api { status: 403, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SpotifyError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_detection() {
        let err = SpotifyError::Api {
            status: 403,
            message: "Restriction violated".to_string(),
        };
        assert!(err.is_forbidden());
        assert_eq!(err.status(), Some(403));

        let err = SpotifyError::Api {
            status: 404,
            message: "No active device".to_string(),
        };
        assert!(!err.is_forbidden());
        assert!(!SpotifyError::NotAuthenticated.is_forbidden());
    }
}
