//! Radio Control
//!
//! A personal "radio" on top of the Spotify Web API.
//!
//! This library provides:
//! - Channels: a persisted list of playlists, zapped through with a key press
//! - A one-shot command queue, fired near the end of the playing track
//!   (pause, jingle, run the command, resume)
//! - Spotify OAuth login and remote control
//! - Server-Sent Events for real-time updates
//! - Web UI for picking playlists and queueing commands (Pico CSS)

/// Build version, overridable with `RADIO_VERSION` at build time
pub const VERSION: &str = env!("RADIO_VERSION");
/// Commit the binary was built from, or "unknown"
pub const GIT_SHA: &str = env!("RADIO_GIT_SHA");

pub mod api;
pub mod bus;
pub mod config;
pub mod keyboard;
pub mod monitor;
pub mod radio;
pub mod spotify;
pub mod store;
pub mod ui;
