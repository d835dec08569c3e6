//! JSON-file persistence shared between the web front end and the monitor
//!
//! - `playlists.json`: ordered array of playlist context URIs (the channels)
//! - `command.json`: `{"command": "..."}` while a command is pending, `{}` once consumed
//!
//! Both files are fully overwritten on every write (last write wins).
//! Readers never fail: a missing or malformed file reads as "nothing".

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const PLAYLIST_FILE: &str = "playlists.json";
pub const COMMAND_FILE: &str = "command.json";

/// Write `contents` to `path`, creating the parent directory first
fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Channel list store (`playlists.json`)
#[derive(Debug, Clone)]
pub struct ChannelStore {
    path: PathBuf,
}

impl ChannelStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PLAYLIST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the channel list; index in the returned vec is the channel number
    pub fn load(&self) -> Vec<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => {
                tracing::debug!(
                    "No playlists at {}; add some via the web interface",
                    self.path.display()
                );
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Replace the channel list
    pub fn save(&self, channels: &[String]) -> Result<()> {
        let json = serde_json::to_string_pretty(channels)?;
        write_file(&self.path, &json)?;
        tracing::info!("Saved {} playlists", channels.len());
        Ok(())
    }
}

/// On-disk shape of `command.json`
#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
}

/// Pending command store (`command.json`)
#[derive(Debug, Clone)]
pub struct CommandStore {
    path: PathBuf,
}

impl CommandStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(COMMAND_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pending command, if any. Blank commands count as absent.
    pub fn load(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;

        match serde_json::from_str::<CommandFile>(&content) {
            Ok(file) => file
                .command
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            Err(e) => {
                tracing::warn!("Error decoding JSON from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Whether a command is waiting to be fired
    pub fn is_pending(&self) -> bool {
        self.load().is_some()
    }

    /// Queue `command`, replacing any pending one
    pub fn set(&self, command: &str) -> Result<()> {
        let file = CommandFile {
            command: Some(command.to_string()),
        };
        write_file(&self.path, &serde_json::to_string(&file)?)?;
        tracing::info!("Queued command: {}", command);
        Ok(())
    }

    /// Mark the pending command as consumed
    pub fn clear(&self) -> Result<()> {
        write_file(&self.path, &serde_json::to_string(&CommandFile::default())?)?;
        tracing::debug!("Cleared pending command");
        Ok(())
    }
}
