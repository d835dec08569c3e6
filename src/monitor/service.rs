//! Polling loop around [`PlaybackMonitor`]
//!
//! One sequential task: poll, read the pending command, step the monitor and,
//! when it fires, await the trigger action before the next tick. Poll failures
//! are logged and skipped; the loop only exits on shutdown.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    MonitorSettings, MonitorState, PlaybackMonitor, PlaybackSample, PlaybackSource, TriggerAction,
};
use crate::bus::{BusEvent, SharedBus};
use crate::store::CommandStore;

/// Log every Nth failure of a streak at warn level (the rest at debug)
const FAILURE_LOG_EVERY: u32 = 60;

/// Snapshot of the monitor for `/status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub state: MonitorState,
    pub last_sample: Option<PlaybackSample>,
    pub last_fired_track_id: Option<String>,
    pub fire_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct MonitorService {
    source: Arc<dyn PlaybackSource>,
    action: Arc<dyn TriggerAction>,
    commands: CommandStore,
    bus: SharedBus,
    settings: MonitorSettings,
    poll_interval: Duration,
    status: Arc<RwLock<MonitorStatus>>,
    /// Wrapped in RwLock to allow creating fresh token on restart
    shutdown: Arc<RwLock<CancellationToken>>,
}

impl MonitorService {
    pub fn new(
        source: Arc<dyn PlaybackSource>,
        action: Arc<dyn TriggerAction>,
        commands: CommandStore,
        bus: SharedBus,
        settings: MonitorSettings,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            action,
            commands,
            bus,
            settings,
            poll_interval,
            status: Arc::new(RwLock::new(MonitorStatus::default())),
            shutdown: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    /// Spawn the polling loop. No-op if already running.
    pub async fn start(&self) -> Result<()> {
        {
            let mut status = self.status.write().await;
            if status.running {
                return Ok(());
            }
            status.running = true;
        }

        // Fresh token for this run (a previous one may be cancelled)
        let shutdown = {
            let mut token = self.shutdown.write().await;
            *token = CancellationToken::new();
            token.clone()
        };

        let service = self.clone();
        tokio::spawn(async move { service.run(shutdown).await });

        info!(
            "Playback monitor started (window {} ms, poll {:?})",
            self.settings.trigger_window_ms, self.poll_interval
        );
        Ok(())
    }

    pub async fn stop(&self) {
        self.shutdown.read().await.cancel();
        self.status.write().await.running = false;
    }

    /// Run the loop until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut monitor = PlaybackMonitor::new(self.settings);
        let mut poll_timer = interval(self.poll_interval);
        // A long jingle/command must not cause a burst of catch-up polls
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Playback monitor shutting down");
                    break;
                }
                _ = poll_timer.tick() => {
                    self.tick(&mut monitor).await;
                }
            }
        }

        self.status.write().await.running = false;
    }

    /// One poll + step. Exposed for tests that drive the loop by hand.
    pub async fn tick(&self, monitor: &mut PlaybackMonitor) {
        let sample = match self.source.current_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                self.record_failure(&e).await;
                return;
            }
        };

        let command = self.commands.load();
        let observation = monitor.observe(sample.as_ref(), command.is_some());

        match &sample {
            Some(s) => debug!(
                track_id = %s.track_id,
                progress_ms = s.progress_ms,
                duration_ms = s.duration_ms,
                is_playing = s.is_playing,
                "Playback progress"
            ),
            None => debug!("No active playback detected"),
        }

        if observation.track_started {
            if let Some(s) = &sample {
                info!(
                    "Track started: {}",
                    s.title.as_deref().unwrap_or(&s.track_id)
                );
                self.bus.publish(BusEvent::TrackStarted {
                    track_id: s.track_id.clone(),
                    title: s.title.clone(),
                });
            }
        }

        let mut fired = false;
        if observation.fire {
            if let (Some(s), Some(command)) = (&sample, &command) {
                self.fire(s, command).await;
                fired = true;
            }
        }

        let mut status = self.status.write().await;
        status.state = monitor.state().clone();
        status.last_fired_track_id = monitor.last_fired_track_id().map(str::to_string);
        status.last_sample = sample;
        status.consecutive_failures = 0;
        status.last_error = None;
        if fired {
            status.fire_count += 1;
        }
    }

    async fn fire(&self, sample: &PlaybackSample, command: &str) {
        info!(
            "Song is about to end ({} ms left), firing: {}",
            sample.remaining_ms(),
            command
        );
        self.bus.publish(BusEvent::TriggerFired {
            track_id: sample.track_id.clone(),
            command: command.to_string(),
        });

        if let Err(e) = self.action.fire(&sample.track_id, command).await {
            warn!("Error during jingle/command execution: {:#}", e);
        }

        // Only clear what we fired; a command queued meanwhile stays pending
        if self.commands.load().as_deref() == Some(command) {
            match self.commands.clear() {
                Ok(()) => self.bus.publish(BusEvent::CommandCleared),
                Err(e) => warn!("Failed to clear pending command: {:#}", e),
            }
        }
    }

    async fn record_failure(&self, error: &anyhow::Error) {
        let mut status = self.status.write().await;
        status.consecutive_failures += 1;
        status.last_error = Some(error.to_string());

        let n = status.consecutive_failures;
        if n == 1 || n % FAILURE_LOG_EVERY == 0 {
            warn!("Error monitoring playback ({} in a row): {}", n, error);
        } else {
            debug!("Error monitoring playback ({} in a row): {}", n, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of poll results
    struct ScriptedSource {
        polls: Mutex<VecDeque<anyhow::Result<Option<PlaybackSample>>>>,
    }

    impl ScriptedSource {
        fn new(polls: Vec<anyhow::Result<Option<PlaybackSample>>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
            }
        }
    }

    #[async_trait]
    impl PlaybackSource for ScriptedSource {
        async fn current_sample(&self) -> anyhow::Result<Option<PlaybackSample>> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct RecordingAction {
        fired: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl TriggerAction for RecordingAction {
        async fn fire(&self, track_id: &str, command: &str) -> anyhow::Result<()> {
            self.fired
                .lock()
                .unwrap()
                .push((track_id.to_string(), command.to_string()));
            if self.fail {
                anyhow::bail!("command failed");
            }
            Ok(())
        }
    }

    fn playing(track: &str, progress_ms: u64) -> anyhow::Result<Option<PlaybackSample>> {
        Ok(Some(PlaybackSample::new(track, progress_ms, 180_000, true)))
    }

    fn service(
        source: ScriptedSource,
        action: Arc<RecordingAction>,
        commands: CommandStore,
    ) -> MonitorService {
        MonitorService::new(
            Arc::new(source),
            action,
            commands,
            create_bus(),
            MonitorSettings {
                trigger_window_ms: 1000,
                rearm_progress_ms: 1000,
            },
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn fires_once_and_clears_command() {
        let dir = tempfile::tempdir().unwrap();
        let commands = CommandStore::new(dir.path());
        commands.set("echo hi").unwrap();

        let action = Arc::new(RecordingAction::default());
        let svc = service(
            ScriptedSource::new(vec![
                playing("t1", 178_500),
                playing("t1", 178_900),
                playing("t1", 179_200),
                playing("t1", 179_800),
                playing("t2", 200),
            ]),
            action.clone(),
            commands.clone(),
        );

        let mut monitor = PlaybackMonitor::new(svc.settings);
        for _ in 0..5 {
            svc.tick(&mut monitor).await;
        }

        assert_eq!(
            action.fired.lock().unwrap().as_slice(),
            &[("t1".to_string(), "echo hi".to_string())]
        );
        assert_eq!(commands.load(), None);
        let status = svc.status().await;
        assert_eq!(status.fire_count, 1);
        assert_eq!(status.last_fired_track_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn transient_errors_do_not_break_edge_detection() {
        let dir = tempfile::tempdir().unwrap();
        let commands = CommandStore::new(dir.path());
        commands.set("echo hi").unwrap();

        let action = Arc::new(RecordingAction::default());
        let svc = service(
            ScriptedSource::new(vec![
                playing("t1", 170_000),
                Err(anyhow::anyhow!("503 Service Unavailable")),
                Err(anyhow::anyhow!("503 Service Unavailable")),
                Err(anyhow::anyhow!("503 Service Unavailable")),
                playing("t1", 179_500),
                playing("t1", 179_900),
            ]),
            action.clone(),
            commands,
        );

        let mut monitor = PlaybackMonitor::new(svc.settings);
        for _ in 0..4 {
            svc.tick(&mut monitor).await;
        }
        assert_eq!(svc.status().await.consecutive_failures, 3);
        assert!(action.fired.lock().unwrap().is_empty());

        svc.tick(&mut monitor).await;
        svc.tick(&mut monitor).await;

        assert_eq!(action.fired.lock().unwrap().len(), 1);
        let status = svc.status().await;
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_action_still_consumes_command() {
        let dir = tempfile::tempdir().unwrap();
        let commands = CommandStore::new(dir.path());
        commands.set("false").unwrap();

        let action = Arc::new(RecordingAction {
            fail: true,
            ..Default::default()
        });
        let svc = service(
            ScriptedSource::new(vec![playing("t1", 179_500), playing("t2", 179_500)]),
            action.clone(),
            commands.clone(),
        );

        let mut monitor = PlaybackMonitor::new(svc.settings);
        svc.tick(&mut monitor).await;
        svc.tick(&mut monitor).await;

        assert_eq!(action.fired.lock().unwrap().len(), 1);
        assert_eq!(commands.load(), None);
    }

    #[tokio::test]
    async fn no_pending_command_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        let action = Arc::new(RecordingAction::default());
        let svc = service(
            ScriptedSource::new(vec![playing("t1", 179_000), playing("t1", 179_900)]),
            action.clone(),
            CommandStore::new(dir.path()),
        );

        let mut monitor = PlaybackMonitor::new(svc.settings);
        svc.tick(&mut monitor).await;
        svc.tick(&mut monitor).await;

        assert!(action.fired.lock().unwrap().is_empty());
        assert!(matches!(svc.status().await.state, MonitorState::Armed { .. }));
    }

    #[tokio::test]
    async fn start_and_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            ScriptedSource::new(vec![]),
            Arc::new(RecordingAction::default()),
            CommandStore::new(dir.path()),
        );

        svc.start().await.unwrap();
        assert!(svc.status().await.running);
        // Second start is a no-op
        svc.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        svc.stop().await;
        assert!(!svc.status().await.running);
    }
}
