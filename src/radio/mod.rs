//! Radio controller: channel zapping, play/pause and the end-of-track action
//!
//! Channels are the persisted playlist URIs; the current channel index lives
//! here. The controller is shared by the keyboard task, the HTTP handlers and
//! the playback monitor (as its [`TriggerAction`]).

pub mod jingle;
pub mod shell;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::config::{MonitorConfig, TriggerMode};
use crate::monitor::TriggerAction;
use crate::spotify::SpotifyClient;
use crate::store::ChannelStore;
use jingle::JinglePlayer;

/// Controller settings (a slice of `MonitorConfig`)
#[derive(Debug, Clone)]
pub struct RadioSettings {
    pub trigger_mode: TriggerMode,
    pub jingle_path: PathBuf,
    /// Delay before the single retry of a 403'd playback start
    pub forbidden_retry_delay: Duration,
}

impl From<&MonitorConfig> for RadioSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            trigger_mode: config.trigger_mode,
            jingle_path: config.jingle_path_or_default(),
            forbidden_retry_delay: Duration::from_millis(config.forbidden_retry_delay_ms),
        }
    }
}

pub struct RadioController {
    client: Arc<SpotifyClient>,
    channels: ChannelStore,
    bus: SharedBus,
    settings: RadioSettings,
    jingle: Option<Arc<dyn JinglePlayer>>,
    current: RwLock<usize>,
}

impl RadioController {
    pub fn new(
        client: Arc<SpotifyClient>,
        channels: ChannelStore,
        bus: SharedBus,
        settings: RadioSettings,
        jingle: Option<Arc<dyn JinglePlayer>>,
    ) -> Self {
        Self {
            client,
            channels,
            bus,
            settings,
            jingle,
            current: RwLock::new(0),
        }
    }

    pub fn client(&self) -> &Arc<SpotifyClient> {
        &self.client
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }

    pub async fn current_channel(&self) -> usize {
        *self.current.read().await
    }

    /// Show a message to the operator (log + SSE)
    pub fn display(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.bus.publish(BusEvent::RadioDisplay { message });
    }

    /// Start channel `index` on the first available device
    pub async fn play_channel(&self, index: usize) -> Result<()> {
        let channels = self.channels.load();
        if channels.is_empty() {
            bail!("No playlists configured");
        }
        let uri = channels
            .get(index)
            .ok_or_else(|| anyhow!("Channel {} out of range ({} channels)", index, channels.len()))?;

        self.play_uri(uri).await?;
        *self.current.write().await = index;

        self.display(format!("Channel {}: {}", index, uri));
        self.bus.publish(BusEvent::ChannelChanged {
            index,
            playlist_uri: uri.clone(),
        });
        Ok(())
    }

    /// Start any context URI on the first available device, shuffled
    pub async fn play_uri(&self, uri: &str) -> Result<()> {
        let devices = self.client.devices().await?;
        let device = devices
            .first()
            .ok_or_else(|| anyhow!("No active devices found"))?;
        let device_id = device.id.as_deref();
        info!("Playing {} on {}", uri, device.name);

        if let Err(e) = self.client.set_shuffle(true, device_id).await {
            warn!("Failed to enable shuffle: {}", e);
        }

        match self.client.start_playback(device_id, uri).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_forbidden() => {
                warn!(
                    "Playback start forbidden ({}), retrying in {:?}",
                    e, self.settings.forbidden_retry_delay
                );
                tokio::time::sleep(self.settings.forbidden_retry_delay).await;
                self.client
                    .start_playback(device_id, uri)
                    .await
                    .context("Playback start failed after retry")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advance to the next channel, wrapping around
    pub async fn zap_next(&self) -> Result<()> {
        let len = self.channels.load().len();
        if len == 0 {
            warn!("No playlists available to zap");
            return Ok(());
        }
        let next = (self.current_channel().await + 1) % len;
        self.play_channel(next).await
    }

    /// Toggle playback; with nothing playing, start the first channel
    pub async fn play_pause(&self) -> Result<()> {
        match self.client.current_playback().await? {
            Some(playback) if playback.item.is_some() => {
                if playback.is_playing {
                    self.pause().await
                } else {
                    self.resume().await
                }
            }
            _ => {
                info!("Nothing playing, starting channel 0");
                self.play_channel(0).await
            }
        }
    }

    pub async fn pause(&self) -> Result<()> {
        self.client.pause().await?;
        self.display("Playback paused");
        self.bus.publish(BusEvent::PlaybackPaused);
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.client.resume().await?;
        self.display("Playback resumed");
        self.bus.publish(BusEvent::PlaybackResumed);
        Ok(())
    }

    async fn play_jingle(&self) {
        let path = &self.settings.jingle_path;
        let Some(player) = &self.jingle else {
            warn!("No jingle player available, skipping jingle");
            return;
        };
        if !path.exists() {
            warn!("Jingle not found at {}, skipping", path.display());
            return;
        }
        if let Err(e) = player.play(path).await {
            warn!("Jingle playback failed: {:#}", e);
        }
    }

    /// Pause, jingle, run the command, resume
    async fn execute(&self, command: &str) -> Result<()> {
        if let Err(e) = self.pause().await {
            warn!("Failed to pause before command: {:#}", e);
        }

        self.play_jingle().await;

        self.display(format!("Executing command: {}", command));
        let result = shell::run_shell(command).await;
        if let Ok(outcome) = &result {
            self.bus.publish(BusEvent::CommandExecuted {
                command: command.to_string(),
                success: outcome.success,
                exit_code: outcome.exit_code,
            });
        }

        if let Err(e) = self.resume().await {
            let current = self.current_channel().await;
            warn!("Resume failed ({:#}), restarting channel {}", e, current);
            self.play_channel(current).await?;
        }

        result.map(|_| ())
    }
}

#[async_trait]
impl TriggerAction for RadioController {
    async fn fire(&self, _track_id: &str, command: &str) -> Result<()> {
        match self.settings.trigger_mode {
            TriggerMode::Display => {
                self.display(format!("Command: {}", command));
                Ok(())
            }
            TriggerMode::Execute => self.execute(command).await,
        }
    }
}
