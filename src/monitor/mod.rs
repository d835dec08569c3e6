//! Playback-progress monitor and one-shot end-of-track trigger
//!
//! The monitor is fed one playback sample per poll and decides when a pending
//! command should fire. It is edge-triggered and fires at most once per track:
//!
//! ```text
//! IDLE ──(track playing)──▶ ARMED ──(window hit + command pending)──▶ FIRED
//!   ▲                                                                  │
//!   └──────────────(new track id, or same track restarted)─────────────┘
//! ```
//!
//! `observe` is a pure step function; the polling loop lives in [`service`].

pub mod service;

pub use service::{MonitorService, MonitorStatus};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MonitorConfig;

/// One poll of the remote playback state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSample {
    pub track_id: String,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PlaybackSample {
    pub fn new(track_id: impl Into<String>, progress_ms: u64, duration_ms: u64, is_playing: bool) -> Self {
        Self {
            track_id: track_id.into(),
            progress_ms,
            duration_ms,
            is_playing,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.progress_ms)
    }
}

/// Source of playback samples (the streaming service, or a fake in tests)
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// `Ok(None)` when nothing is playing; `Err` on a transient poll failure
    async fn current_sample(&self) -> anyhow::Result<Option<PlaybackSample>>;
}

/// Action run when the trigger fires
#[async_trait]
pub trait TriggerAction: Send + Sync {
    async fn fire(&self, track_id: &str, command: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Fire when `duration - progress <= trigger_window_ms`
    pub trigger_window_ms: u64,
    /// A same-track progress drop to at most this counts as a restart
    pub rearm_progress_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            trigger_window_ms: 5000,
            rearm_progress_ms: 3000,
        }
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    /// The rearm threshold never drops below two poll intervals: the first
    /// poll after a restart can land anywhere in one interval plus latency.
    fn from(config: &MonitorConfig) -> Self {
        Self {
            trigger_window_ms: config.trigger_window_ms,
            rearm_progress_ms: config
                .rearm_progress_ms
                .max(config.poll_interval_ms.saturating_mul(2)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Idle,
    Armed { track_id: String },
    Fired { track_id: String },
}

/// Result of one `observe` step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// Run the trigger action now
    pub fire: bool,
    /// The sample belongs to a new track (or the same track from the start)
    pub track_started: bool,
}

#[derive(Debug, Clone)]
pub struct PlaybackMonitor {
    settings: MonitorSettings,
    state: MonitorState,
    last_track_id: Option<String>,
    last_progress_ms: Option<u64>,
    last_fired_track_id: Option<String>,
}

impl PlaybackMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            state: MonitorState::Idle,
            last_track_id: None,
            last_progress_ms: None,
            last_fired_track_id: None,
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, MonitorState::Armed { .. })
    }

    pub fn last_fired_track_id(&self) -> Option<&str> {
        self.last_fired_track_id.as_deref()
    }

    /// Feed one poll result. `None` (nothing playing, or no data this tick)
    /// leaves the state untouched.
    pub fn observe(&mut self, sample: Option<&PlaybackSample>, command_pending: bool) -> Observation {
        let mut observation = Observation::default();
        let Some(sample) = sample else {
            return observation;
        };

        let new_track = self.last_track_id.as_deref() != Some(sample.track_id.as_str());
        let restarted = !new_track
            && sample.progress_ms <= self.settings.rearm_progress_ms
            && self
                .last_progress_ms
                .is_some_and(|previous| sample.progress_ms < previous);

        if new_track || restarted {
            self.state = MonitorState::Idle;
            observation.track_started = true;
        }
        self.last_track_id = Some(sample.track_id.clone());
        self.last_progress_ms = Some(sample.progress_ms);

        // Paused: hold the current state until playback resumes
        if !sample.is_playing {
            return observation;
        }

        if self.state == MonitorState::Idle {
            self.state = MonitorState::Armed {
                track_id: sample.track_id.clone(),
            };
        }

        let in_window =
            sample.duration_ms > 0 && sample.remaining_ms() <= self.settings.trigger_window_ms;

        if self.is_armed() && in_window && command_pending {
            self.state = MonitorState::Fired {
                track_id: sample.track_id.clone(),
            };
            self.last_fired_track_id = Some(sample.track_id.clone());
            observation.fire = true;
        }

        observation
    }
}
