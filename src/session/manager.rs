//! Session lifecycle management
//!
//! The manager owns the Idle/Recording state machine and the set of
//! recording channels. Starting a session is all-or-nothing: every
//! channel must initialize and start, or everything already running is
//! torn back down and the session directory removed.

use crate::error::{RecorderError, RecorderResult};
use crate::session::channel::SessionChannel;
use crate::session::render::EncoderSlot;
use crate::session::state::{coerce_snapshot_interval, Session, SessionState};
use crate::session::video::{VideoConfig, VideoEncoder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted as sessions start and stop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    Started { session_id: u64 },
    Stopped { session_id: u64, files: Vec<PathBuf> },
    Error { message: String },
}

pub struct SessionManager {
    recordings_dir: PathBuf,
    state: SessionState,
    session: Option<Session>,
    channels: Vec<Box<dyn SessionChannel>>,
    /// Video settings for the session's encoder. `None` disables the
    /// video track (and lets tests run without ffmpeg or a camera).
    video: Option<VideoConfig>,
    encoder_slot: EncoderSlot,
    encoder: Option<Arc<VideoEncoder>>,
    snapshot_interval_ms: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        recordings_dir: PathBuf,
        channels: Vec<Box<dyn SessionChannel>>,
        video: Option<VideoConfig>,
        encoder_slot: EncoderSlot,
        snapshot_interval_ms: Arc<AtomicU64>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            recordings_dir,
            state: SessionState::Idle,
            session: None,
            channels,
            video,
            encoder_slot,
            encoder: None,
            snapshot_interval_ms,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn set_video(&mut self, video: Option<VideoConfig>) {
        self.video = video;
    }

    /// Start a new recording session with the given snapshot interval.
    pub async fn start(&mut self, snapshot_interval_ms: u64) -> RecorderResult<u64> {
        if self.state == SessionState::Recording {
            return Err(RecorderError::AlreadyRecording);
        }

        self.snapshot_interval_ms.store(
            coerce_snapshot_interval(snapshot_interval_ms),
            Ordering::SeqCst,
        );

        let session = Session::begin(&self.recordings_dir);
        std::fs::create_dir_all(&session.dir)?;
        tracing::info!("Starting session {} at {}", session.id, session.dir.display());

        for i in 0..self.channels.len() {
            if let Err(e) = self.channels[i].initialize(&session.dir).await {
                let id = self.channels[i].id().to_string();
                self.abort_start(&session, 0).await;
                self.emit_error(format!("channel {id} failed to initialize: {e}"));
                return Err(e);
            }
        }

        for i in 0..self.channels.len() {
            if let Err(e) = self.channels[i].start().await {
                let id = self.channels[i].id().to_string();
                self.abort_start(&session, i).await;
                self.emit_error(format!("channel {id} failed to start: {e}"));
                return Err(e);
            }
        }

        if let Some(config) = self.video {
            match VideoEncoder::start(&session.dir, config) {
                Ok(encoder) => {
                    let encoder = Arc::new(encoder);
                    *self.encoder_slot.write() = Some(encoder.clone());
                    self.encoder = Some(encoder);
                }
                Err(e) => {
                    self.abort_start(&session, self.channels.len()).await;
                    self.emit_error(format!("video encoder failed to start: {e}"));
                    return Err(e);
                }
            }
        }

        let id = session.id;
        self.session = Some(session);
        self.state = SessionState::Recording;
        let _ = self.events.send(SessionEvent::Started { session_id: id });
        Ok(id)
    }

    /// Stop the current session, joining every channel and finalizing
    /// the video track before returning.
    pub async fn stop(&mut self) -> RecorderResult<Vec<PathBuf>> {
        if self.state != SessionState::Recording {
            return Err(RecorderError::NotRecording);
        }

        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.stop().await {
                tracing::error!("Channel {} failed to stop: {}", channel.id(), e);
            }
        }

        // Detach the render loop from the encoder before finalizing.
        *self.encoder_slot.write() = None;
        if let Some(encoder) = self.encoder.take() {
            if let Err(e) = encoder.finish() {
                tracing::error!("Video encoder failed to finish: {}", e);
            }
        }

        let mut files: Vec<PathBuf> = self
            .channels
            .iter()
            .flat_map(|c| c.output_files())
            .collect();
        let session = self.session.take();
        if let Some(session) = &session {
            let video = session.dir.join("video.mp4");
            if video.exists() {
                files.push(video);
            }
        }

        self.state = SessionState::Idle;
        if let Some(session) = session {
            tracing::info!("Session {} stopped", session.id);
            let _ = self.events.send(SessionEvent::Stopped {
                session_id: session.id,
                files: files.clone(),
            });
        }
        Ok(files)
    }

    /// List recorded session directories, oldest first.
    pub fn list_sessions(&self) -> RecorderResult<Vec<PathBuf>> {
        if !self.recordings_dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.recordings_dir)? {
            let path = entry?.path();
            let is_session = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("session_"));
            if is_session {
                sessions.push(path);
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Delete every recorded session. Refused while recording.
    pub fn purge(&self) -> RecorderResult<usize> {
        if self.state == SessionState::Recording {
            return Err(RecorderError::AlreadyRecording);
        }
        let sessions = self.list_sessions()?;
        let count = sessions.len();
        for session in sessions {
            std::fs::remove_dir_all(&session)?;
        }
        tracing::info!("Purged {} sessions", count);
        Ok(count)
    }

    /// Tear down a partially started session: stop the first `started`
    /// channels and remove the session directory best-effort.
    async fn abort_start(&mut self, session: &Session, started: usize) {
        for channel in self.channels.iter_mut().take(started) {
            if let Err(e) = channel.stop().await {
                tracing::error!("Channel {} failed to stop during abort: {}", channel.id(), e);
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&session.dir) {
            tracing::warn!(
                "Could not remove aborted session dir {}: {}",
                session.dir.display(),
                e
            );
        }
    }

    fn emit_error(&self, message: String) {
        tracing::error!("{}", message);
        let _ = self.events.send(SessionEvent::Error { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parking_lot::RwLock;
    use tempfile::tempdir;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct FakeChannel {
        id: String,
        log: CallLog,
        fail_on_start: bool,
        output: Option<PathBuf>,
    }

    impl FakeChannel {
        fn new(id: &str, log: CallLog) -> Self {
            Self {
                id: id.to_string(),
                log,
                fail_on_start: false,
                output: None,
            }
        }
    }

    #[async_trait]
    impl SessionChannel for FakeChannel {
        fn id(&self) -> &str {
            &self.id
        }

        async fn initialize(&mut self, session_dir: &Path) -> RecorderResult<()> {
            self.log.lock().push(format!("{}:init", self.id));
            self.output = Some(session_dir.join(format!("{}.out", self.id)));
            Ok(())
        }

        async fn start(&mut self) -> RecorderResult<()> {
            if self.fail_on_start {
                return Err(RecorderError::DeviceUnavailable(format!(
                    "{} device missing",
                    self.id
                )));
            }
            self.log.lock().push(format!("{}:start", self.id));
            if let Some(path) = &self.output {
                std::fs::write(path, b"data")?;
            }
            Ok(())
        }

        async fn stop(&mut self) -> RecorderResult<()> {
            self.log.lock().push(format!("{}:stop", self.id));
            Ok(())
        }

        fn output_files(&self) -> Vec<PathBuf> {
            self.output.iter().filter(|p| p.exists()).cloned().collect()
        }
    }

    fn manager_with(
        dir: &Path,
        channels: Vec<Box<dyn SessionChannel>>,
    ) -> SessionManager {
        SessionManager::new(
            dir.to_path_buf(),
            channels,
            None,
            Arc::new(RwLock::new(None)),
            Arc::new(AtomicU64::new(1000)),
        )
    }

    #[tokio::test]
    async fn start_stop_cycle_produces_session_dir_and_files() {
        let dir = tempdir().unwrap();
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let channels: Vec<Box<dyn SessionChannel>> = vec![
            Box::new(FakeChannel::new("audio", log.clone())),
            Box::new(FakeChannel::new("snapshots", log.clone())),
        ];
        let mut manager = manager_with(dir.path(), channels);
        let mut events = manager.subscribe();

        let id = manager.start(1000).await.unwrap();
        assert_eq!(manager.state(), SessionState::Recording);
        assert!(dir.path().join(format!("session_{id}")).is_dir());
        assert!(matches!(
            events.try_recv().unwrap(),
            SessionEvent::Started { session_id } if session_id == id
        ));

        let files = manager.stop().await.unwrap();
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(files.len(), 2);
        assert_eq!(
            *log.lock(),
            vec![
                "audio:init",
                "snapshots:init",
                "audio:start",
                "snapshots:start",
                "audio:stop",
                "snapshots:stop",
            ]
        );
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = tempdir().unwrap();
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager_with(
            dir.path(),
            vec![Box::new(FakeChannel::new("audio", log))],
        );

        manager.start(1000).await.unwrap();
        assert!(matches!(
            manager.start(1000).await,
            Err(RecorderError::AlreadyRecording)
        ));
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let dir = tempdir().unwrap();
        let mut manager = manager_with(dir.path(), vec![]);
        assert!(matches!(
            manager.stop().await,
            Err(RecorderError::NotRecording)
        ));
    }

    #[tokio::test]
    async fn failed_channel_start_tears_down_the_session() {
        let dir = tempdir().unwrap();
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let ok = FakeChannel::new("audio", log.clone());
        let mut bad = FakeChannel::new("video", log.clone());
        bad.fail_on_start = true;

        let mut manager = manager_with(
            dir.path(),
            vec![Box::new(ok), Box::new(bad)],
        );

        assert!(manager.start(1000).await.is_err());
        assert_eq!(manager.state(), SessionState::Idle);
        // The already-started channel was stopped again.
        assert!(log.lock().contains(&"audio:stop".to_string()));
        // No half-written session directory remains.
        assert!(manager.list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn interval_is_coerced_into_shared_atomic() {
        let dir = tempdir().unwrap();
        let interval = Arc::new(AtomicU64::new(0));
        let mut manager = SessionManager::new(
            dir.path().to_path_buf(),
            vec![],
            None,
            Arc::new(RwLock::new(None)),
            interval.clone(),
        );

        manager.start(50).await.unwrap();
        assert_eq!(interval.load(Ordering::SeqCst), 1000);
        manager.stop().await.unwrap();

        manager.start(2500).await.unwrap();
        assert_eq!(interval.load(Ordering::SeqCst), 2500);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn purge_removes_sessions_only_while_idle() {
        let dir = tempdir().unwrap();
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager_with(
            dir.path(),
            vec![Box::new(FakeChannel::new("audio", log))],
        );

        manager.start(1000).await.unwrap();
        assert!(matches!(
            manager.purge(),
            Err(RecorderError::AlreadyRecording)
        ));
        manager.stop().await.unwrap();

        assert_eq!(manager.purge().unwrap(), 1);
        assert!(manager.list_sessions().unwrap().is_empty());
    }
}
