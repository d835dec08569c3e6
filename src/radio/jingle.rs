//! Jingle playback
//!
//! Two players: an external command (`monitor.jingle_player`, the file path is
//! appended as the last argument) or, with the `audio` feature, in-process
//! decoding through rodio. Both block until the jingle has finished.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::config::MonitorConfig;

#[async_trait]
pub trait JinglePlayer: Send + Sync {
    /// Play `path` to the end
    async fn play(&self, path: &Path) -> Result<()>;
}

/// Runs an external player, e.g. `mpg123 -q` or `afplay`
pub struct ProcessJingle {
    program: String,
    args: Vec<String>,
}

impl ProcessJingle {
    /// Parse a whitespace-separated command line; `None` when it is blank
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl JinglePlayer for ProcessJingle {
    async fn play(&self, path: &Path) -> Result<()> {
        debug!("Playing jingle with {}: {}", self.program, path.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to start jingle player {}", self.program))?;

        if !status.success() {
            bail!("Jingle player {} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// In-process decoder on a blocking thread
#[cfg(feature = "audio")]
pub struct RodioJingle;

#[cfg(feature = "audio")]
#[async_trait]
impl JinglePlayer for RodioJingle {
    async fn play(&self, path: &Path) -> Result<()> {
        use rodio::{Decoder, OutputStream, Sink};
        use std::fs::File;
        use std::io::BufReader;

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let (_stream, handle) =
                OutputStream::try_default().context("No audio output device")?;
            let sink = Sink::try_new(&handle).context("Failed to open audio sink")?;
            let file = File::open(&path)
                .with_context(|| format!("Failed to open jingle {}", path.display()))?;
            let source = Decoder::new(BufReader::new(file))
                .with_context(|| format!("Failed to decode jingle {}", path.display()))?;
            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        })
        .await
        .context("Jingle playback task panicked")?
    }
}

/// Pick a player from config. An explicit `jingle_player` wins; otherwise the
/// built-in decoder when compiled in.
pub fn player_from_config(config: &MonitorConfig) -> Option<Arc<dyn JinglePlayer>> {
    if let Some(player) = config
        .jingle_player
        .as_deref()
        .and_then(ProcessJingle::from_command_line)
    {
        return Some(Arc::new(player));
    }

    #[cfg(feature = "audio")]
    {
        Some(Arc::new(RodioJingle))
    }

    #[cfg(not(feature = "audio"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_player_command_line() {
        let player = ProcessJingle::from_command_line("mpg123  -q --no-control").unwrap();
        assert_eq!(player.program, "mpg123");
        assert_eq!(player.args, vec!["-q", "--no-control"]);

        assert!(ProcessJingle::from_command_line("   ").is_none());
    }

    #[test]
    fn configured_player_is_used() {
        let config = MonitorConfig {
            jingle_player: Some("afplay".to_string()),
            ..MonitorConfig::default()
        };
        assert!(player_from_config(&config).is_some());
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn no_player_without_config_or_audio_feature() {
        assert!(player_from_config(&MonitorConfig::default()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_player_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let jingle = dir.path().join("Jingle.mp3");
        std::fs::write(&jingle, b"").unwrap();

        let ok = ProcessJingle::from_command_line("true").unwrap();
        ok.play(&jingle).await.unwrap();

        let failing = ProcessJingle::from_command_line("false").unwrap();
        assert!(failing.play(&jingle).await.is_err());
    }
}
