//! OAuth authorization-code flow with a file-backed token cache
//!
//! The web front end drives the login (`authorize_url` → `/callback` →
//! `exchange_code`); the monitor and controller only ever call `access_token`,
//! which refreshes the token when it is about to expire.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::types::{ApiErrorDetail, Token, TokenResponse};
use super::SpotifyError;
use crate::config::SpotifyConfig;

pub const TOKEN_CACHE_FILE: &str = "token.json";
/// Refresh this many seconds before the token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;

pub struct SpotifyAuth {
    http: Client,
    config: SpotifyConfig,
    cache_path: PathBuf,
    token: RwLock<Option<Token>>,
    /// `state` of the authorize redirect currently in flight
    pending_state: RwLock<Option<String>>,
}

impl SpotifyAuth {
    /// Create the auth manager, loading a cached token from `data_dir` if present
    pub fn new(config: SpotifyConfig, data_dir: &Path) -> Self {
        #[allow(clippy::expect_used)] // HTTP client creation only fails if TLS setup fails
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        let cache_path = data_dir.join(TOKEN_CACHE_FILE);
        let token = load_cached_token(&cache_path);
        Self {
            http,
            config,
            cache_path,
            token: RwLock::new(token),
            pending_state: RwLock::new(None),
        }
    }

    /// Client id and secret are both present
    pub fn is_configured(&self) -> bool {
        self.config.client_id.is_some() && self.config.client_secret.is_some()
    }

    /// A token (possibly expired but refreshable) is available
    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    fn credentials(&self) -> Result<(&str, &str), SpotifyError> {
        let id = self
            .config
            .client_id
            .as_deref()
            .ok_or(SpotifyError::NotConfigured("client_id"))?;
        let secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or(SpotifyError::NotConfigured("client_secret"))?;
        Ok((id, secret))
    }

    /// Build the vendor login URL and remember its `state`
    pub async fn authorize_url(&self) -> Result<String, SpotifyError> {
        let (client_id, _) = self.credentials()?;
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let mut url = Url::parse(&format!("{}/authorize", self.config.accounts_base_url))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state);

        *self.pending_state.write().await = Some(state);
        Ok(url.into())
    }

    /// Exchange the callback `code` for a token and cache it
    ///
    /// `state` is checked against the last authorize redirect when one is
    /// pending; a callback without any pending login is accepted as-is.
    pub async fn exchange_code(&self, code: &str, state: Option<&str>) -> Result<(), SpotifyError> {
        {
            let mut pending = self.pending_state.write().await;
            if let Some(expected) = pending.as_deref() {
                if state != Some(expected) {
                    return Err(SpotifyError::InvalidState);
                }
            }
            *pending = None;
        }

        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
            ])
            .await?;

        let token = response.into_token(None);
        self.store_token(token).await;
        info!("Spotify login complete");
        Ok(())
    }

    /// A valid access token, refreshing it first if it is about to expire
    pub async fn access_token(&self) -> Result<String, SpotifyError> {
        let current = self
            .token
            .read()
            .await
            .clone()
            .ok_or(SpotifyError::NotAuthenticated)?;

        if !current.expires_within(EXPIRY_MARGIN_SECS) {
            return Ok(current.access_token);
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(SpotifyError::NotAuthenticated)?;

        info!("Token expired, refreshing...");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
            ])
            .await?;

        let token = response.into_token(Some(refresh_token));
        let access = token.access_token.clone();
        self.store_token(token).await;
        Ok(access)
    }

    /// Install a token directly (used by the callback and by tests)
    pub async fn store_token(&self, token: Token) {
        save_cached_token(&self.cache_path, &token);
        *self.token.write().await = Some(token);
    }

    /// Forget the cached token (logout)
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
        if self.cache_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.cache_path) {
                warn!("Failed to remove token cache: {}", e);
            }
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let (client_id, client_secret) = self.credentials()?;
        let url = format!("{}/api/token", self.config.accounts_base_url);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let response = self
            .http
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            // Token endpoint errors are {"error": "...", "error_description": "..."}
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("error_description")
                        .or_else(|| v.get("error"))
                        .and_then(|e| e.as_str().map(str::to_string))
                })
                .or_else(|| {
                    serde_json::from_str::<ApiErrorDetail>(&text)
                        .ok()
                        .map(|d| d.message)
                })
                .unwrap_or(text);
            return Err(SpotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn load_cached_token(path: &Path) -> Option<Token> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Token>(&content) {
        Ok(token) => {
            debug!("Loaded cached Spotify token from {}", path.display());
            Some(token)
        }
        Err(e) => {
            warn!("Ignoring unreadable token cache {}: {}", path.display(), e);
            None
        }
    }
}

fn save_cached_token(path: &Path, token: &Token) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match serde_json::to_string_pretty(token) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                tracing::error!("Failed to save token cache: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to serialize token: {}", e),
    }
}
