//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Application name used for platform config/data directories
const APP_DIR_NAME: &str = "radio-control";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub spotify: SpotifyConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub keyboard: KeyboardConfig,
}

fn default_port() -> u16 {
    5001
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Web API root (overridable for tests)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Accounts service root (authorize + token endpoints)
    #[serde(default = "default_accounts_base_url")]
    pub accounts_base_url: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
            api_base_url: default_api_base_url(),
            accounts_base_url: default_accounts_base_url(),
        }
    }
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:5001/callback".to_string()
}

fn default_scope() -> String {
    "user-library-read user-read-playback-state user-modify-playback-state playlist-read-private"
        .to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_accounts_base_url() -> String {
    "https://accounts.spotify.com".to_string()
}

/// What the monitor does when the trigger window is hit with a pending command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Pause, jingle, run the command, resume
    #[default]
    Execute,
    /// Only show the command on the radio display
    Display,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_trigger_window_ms")]
    pub trigger_window_ms: u64,
    /// Progress at or below this counts as "track restarted" (floored at two poll intervals)
    #[serde(default = "default_rearm_progress_ms")]
    pub rearm_progress_ms: u64,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
    /// Defaults to `<data dir>/songs/Jingle.mp3`
    pub jingle_path: Option<PathBuf>,
    /// External player command, e.g. "mpg123 -q"; the jingle path is appended
    pub jingle_player: Option<String>,
    #[serde(default = "default_forbidden_retry_delay_ms")]
    pub forbidden_retry_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            trigger_window_ms: default_trigger_window_ms(),
            rearm_progress_ms: default_rearm_progress_ms(),
            trigger_mode: TriggerMode::default(),
            jingle_path: None,
            jingle_player: None,
            forbidden_retry_delay_ms: default_forbidden_retry_delay_ms(),
        }
    }
}

impl MonitorConfig {
    /// Configured jingle path, or the default location in the data dir
    pub fn jingle_path_or_default(&self) -> PathBuf {
        self.jingle_path
            .clone()
            .unwrap_or_else(|| get_data_dir().join("songs").join("Jingle.mp3"))
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_trigger_window_ms() -> u64 {
    5000
}

fn default_rearm_progress_ms() -> u64 {
    3000
}

fn default_forbidden_retry_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_zap_key")]
    pub zap_key: String,
    #[serde(default = "default_play_pause_key")]
    pub play_pause_key: String,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zap_key: default_zap_key(),
            play_pause_key: default_play_pause_key(),
        }
    }
}

fn default_zap_key() -> String {
    "-".to_string()
}

fn default_play_pause_key() -> String {
    "=".to_string()
}

/// Get config directory (XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RADIO_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Get data directory (XDG_DATA_HOME or platform default)
///
/// Holds `playlists.json`, `command.json`, `token.json` and the jingle.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RADIO_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/share").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to ./data
    PathBuf::from("./data")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("port", default_port() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (RADIO_PORT, RADIO_MONITOR__TRIGGER_WINDOW_MS, etc.)
        .add_source(
            ::config::Environment::with_prefix("RADIO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // Port precedence: RADIO_PORT > PORT > config > default
    if let Ok(port) = std::env::var("RADIO_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    } else if let Ok(port) = std::env::var("PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    }

    // Legacy SPOTIPY_* variables (shared .env files)
    if let Ok(id) = std::env::var("SPOTIPY_CLIENT_ID") {
        builder = builder.set_override("spotify.client_id", id)?;
    }
    if let Ok(secret) = std::env::var("SPOTIPY_CLIENT_SECRET") {
        builder = builder.set_override("spotify.client_secret", secret)?;
    }
    if let Ok(uri) = std::env::var("SPOTIPY_REDIRECT_URI") {
        builder = builder.set_override("spotify.redirect_uri", uri)?;
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
