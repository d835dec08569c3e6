//! Keyboard shortcuts for the radio
//!
//! A raw-mode reader on a blocking thread maps key presses to [`KeyAction`]s
//! and forwards them over a bounded channel. Raw mode swallows SIGINT, so
//! Ctrl+C (and `q`) are mapped to [`KeyAction::Quit`].
//!
//! Raw mode also stops the terminal from turning `\n` into `\r\n`, so log
//! output goes through [`RawModeWriter`] when stderr is a terminal.

use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::KeyboardConfig;

const KEY_CHANNEL_CAPACITY: usize = 16;
/// How often the reader thread checks for shutdown
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Log writer that ends lines with `\r\n` when `translate` is set
pub struct RawModeWriter<W> {
    inner: W,
    translate: bool,
}

impl<W: Write> RawModeWriter<W> {
    pub fn new(inner: W, translate: bool) -> Self {
        Self { inner, translate }
    }
}

impl RawModeWriter<io::Stderr> {
    /// Stderr, translating line endings only when it is a terminal
    pub fn stderr() -> Self {
        let stderr = io::stderr();
        let translate = stderr.is_terminal();
        Self::new(stderr, translate)
    }
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.translate {
            return self.inner.write(buf);
        }
        for (i, line) in buf.split(|b| *b == b'\n').enumerate() {
            if i > 0 {
                self.inner.write_all(b"\r\n")?;
            }
            self.inner.write_all(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ZapNext,
    PlayPause,
    Quit,
}

/// Key bindings resolved from config
#[derive(Debug, Clone)]
pub struct KeyMap {
    zap: char,
    play_pause: char,
}

impl KeyMap {
    pub fn from_config(config: &KeyboardConfig) -> Result<Self> {
        Ok(Self {
            zap: single_char(&config.zap_key, "zap_key")?,
            play_pause: single_char(&config.play_pause_key, "play_pause_key")?,
        })
    }

    pub fn action_for(&self, key: &KeyEvent) -> Option<KeyAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(KeyAction::Quit)
            }
            KeyCode::Char(c) if c == self.zap => Some(KeyAction::ZapNext),
            KeyCode::Char(c) if c == self.play_pause => Some(KeyAction::PlayPause),
            KeyCode::Char('q') => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

fn single_char(value: &str, name: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("keyboard.{} must be a single character, got {:?}", name, value),
    }
}

/// Start the listener. Returns `None` when disabled or stdin is not a terminal.
pub fn spawn_listener(
    config: &KeyboardConfig,
    shutdown: CancellationToken,
) -> Result<Option<(mpsc::Receiver<KeyAction>, JoinHandle<()>)>> {
    if !config.enabled {
        info!("Keyboard shortcuts disabled by config");
        return Ok(None);
    }
    if !std::io::stdin().is_terminal() {
        info!("stdin is not a terminal, keyboard shortcuts disabled");
        return Ok(None);
    }

    let keymap = KeyMap::from_config(config)?;
    let (tx, rx) = mpsc::channel(KEY_CHANNEL_CAPACITY);

    info!(
        "Keyboard shortcuts: '{}' next channel, '{}' play/pause, 'q' quit",
        keymap.zap, keymap.play_pause
    );

    let handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = read_keys(&keymap, &tx, &shutdown) {
            warn!("Keyboard listener stopped: {}", e);
        }
    });
    Ok(Some((rx, handle)))
}

fn read_keys(
    keymap: &KeyMap,
    tx: &mpsc::Sender<KeyAction>,
    shutdown: &CancellationToken,
) -> Result<()> {
    enable_raw_mode()?;
    let result = key_loop(keymap, tx, shutdown);
    disable_raw_mode()?;
    result
}

fn key_loop(
    keymap: &KeyMap,
    tx: &mpsc::Sender<KeyAction>,
    shutdown: &CancellationToken,
) -> Result<()> {
    while !shutdown.is_cancelled() && !tx.is_closed() {
        if !event::poll(POLL_TIMEOUT)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            let Some(action) = keymap.action_for(&key) else {
                continue;
            };
            debug!("Key action: {:?}", action);
            if tx.blocking_send(action).is_err() || action == KeyAction::Quit {
                break;
            }
        }
    }
    Ok(())
}
