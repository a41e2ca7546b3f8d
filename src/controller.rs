//! Top-level recorder facade
//!
//! Wires the capture loop, the live workers, and the session manager
//! together behind one object, and keeps the human-readable status line
//! the UI shows. State-conflict requests (start while recording, stop
//! while idle) surface as status notices, not errors; only device and
//! IO failures propagate.

use crate::capture::frame_source::{list_cameras, CameraInfo, FrameSource};
use crate::capture::AudioRecorder;
use crate::detection::worker::DetectionWorker;
use crate::error::RecorderResult;
use crate::inference::{
    DepthEstimator, ImageCaptioner, ObjectDetector, SpeechTranscriber,
};
use crate::postprocess::PostProcessors;
use crate::session::caption::CaptioningChannel;
use crate::session::channel::SessionChannel;
use crate::session::manager::{SessionEvent, SessionManager};
use crate::session::render::{EncoderSlot, RenderLoop};
use crate::session::snapshot::SnapshotSerializer;
use crate::session::state::{SessionState, SessionText};
use crate::session::video::VideoConfig;
use crate::state::{ConfidenceThreshold, SharedFrameState};
use crate::tracker::{TrackOutput, TrackerConfig};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Tunables for the recorder. `Default` matches the interactive app.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub recordings_dir: PathBuf,
    pub detection_interval: Duration,
    pub caption_interval: Duration,
    pub tracker: TrackerConfig,
    pub video_fps: u32,
    pub confidence_threshold: f32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            detection_interval: Duration::from_millis(100),
            caption_interval: Duration::from_secs(2),
            tracker: TrackerConfig::default(),
            video_fps: 20,
            confidence_threshold: 0.5,
        }
    }
}

/// External inference services the recorder calls into.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub detector: Option<Arc<dyn ObjectDetector>>,
    pub captioner: Option<Arc<dyn ImageCaptioner>>,
    pub depth: Option<Arc<dyn DepthEstimator>>,
    pub transcriber: Option<Arc<dyn SpeechTranscriber>>,
    pub post: PostProcessors,
}

pub struct RecorderController {
    config: RecorderConfig,
    state: Arc<SharedFrameState>,
    threshold: Arc<ConfidenceThreshold>,
    text: Arc<SessionText>,
    status: Mutex<String>,
    transcriber: Option<Arc<dyn SpeechTranscriber>>,
    post: PostProcessors,
    frame_source: Option<FrameSource>,
    detection_worker: Option<DetectionWorker>,
    render_loop: RenderLoop,
    manager: SessionManager,
}

impl RecorderController {
    pub fn new(config: RecorderConfig, collaborators: Collaborators) -> Self {
        let state = Arc::new(SharedFrameState::new());
        let threshold = Arc::new(ConfidenceThreshold::new(config.confidence_threshold));
        let text = Arc::new(SessionText::default());
        let snapshot_interval = Arc::new(AtomicU64::new(1000));
        let encoder_slot: EncoderSlot = Arc::new(RwLock::new(None));

        let detection_worker = collaborators.detector.as_ref().map(|detector| {
            DetectionWorker::start(
                state.clone(),
                detector.clone(),
                threshold.clone(),
                config.detection_interval,
            )
        });
        let render_loop = RenderLoop::start(state.clone(), config.tracker, encoder_slot.clone());

        let mut channels: Vec<Box<dyn SessionChannel>> = vec![
            Box::new(AudioRecorder::new()),
            Box::new(SnapshotSerializer::new(
                state.clone(),
                text.clone(),
                collaborators.depth.clone(),
                render_loop.tracks_handle(),
                snapshot_interval.clone(),
            )),
        ];
        if let Some(captioner) = &collaborators.captioner {
            channels.push(Box::new(CaptioningChannel::new(
                state.clone(),
                captioner.clone(),
                config.caption_interval,
            )));
        }
        let manager = SessionManager::new(
            config.recordings_dir.clone(),
            channels,
            None,
            encoder_slot,
            snapshot_interval,
        );

        Self {
            config,
            state,
            threshold,
            text,
            status: Mutex::new("Ready".to_string()),
            transcriber: collaborators.transcriber,
            post: collaborators.post,
            frame_source: None,
            detection_worker,
            render_loop,
            manager,
        }
    }

    /// Cameras available right now.
    pub fn cameras(&self) -> Vec<CameraInfo> {
        list_cameras()
    }

    /// Switch to (or start) the camera at `index`. The previous capture
    /// loop is stopped first; on failure the recorder is left without a
    /// camera and keeps serving the last published frame.
    pub fn select_camera(&mut self, index: u32) -> RecorderResult<()> {
        if let Some(mut source) = self.frame_source.take() {
            source.stop();
        }
        match FrameSource::start(index, self.state.clone()) {
            Ok(source) => {
                self.set_status(format!("Camera {index} active"));
                self.frame_source = Some(source);
                Ok(())
            }
            Err(e) => {
                self.set_status(format!("Camera error: {e}"));
                Err(e)
            }
        }
    }

    pub fn set_confidence_threshold(&self, value: f32) {
        self.threshold.set(value);
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.threshold.get()
    }

    pub fn set_instruction(&self, text: impl Into<String>) {
        self.text.set_instruction(text);
    }

    pub fn set_intent(&self, text: impl Into<String>) {
        self.text.set_intent(text);
    }

    pub fn instruction(&self) -> String {
        self.text.instruction()
    }

    pub fn intent(&self) -> String {
        self.text.intent()
    }

    /// Capture the instruction by voice. Transcription failures land in
    /// the status line verbatim and leave the stored text untouched.
    pub fn record_instruction(&self) -> bool {
        match self.transcribe() {
            Some(transcript) => {
                self.set_status(format!("Instruction: {transcript}"));
                self.text.set_instruction(transcript);
                true
            }
            None => false,
        }
    }

    /// Capture the intent by voice, same failure handling as
    /// [`record_instruction`](Self::record_instruction).
    pub fn record_intent(&self) -> bool {
        match self.transcribe() {
            Some(transcript) => {
                self.set_status(format!("Intent: {transcript}"));
                self.text.set_intent(transcript);
                true
            }
            None => false,
        }
    }

    fn transcribe(&self) -> Option<String> {
        let transcriber = match &self.transcriber {
            Some(t) => t,
            None => {
                self.set_status("Speech recognition not configured".to_string());
                return None;
            }
        };
        match transcriber.transcribe() {
            Ok(transcript) => Some(transcript),
            Err(e) => {
                self.set_status(e.to_string());
                None
            }
        }
    }

    /// Start a recording session. Video dimensions come from the current
    /// live frame; without one the session records audio and snapshots
    /// only.
    pub async fn start_recording(&mut self, snapshot_interval_ms: u64) -> RecorderResult<()> {
        let video = self.state.read_frame().map(|frame| VideoConfig {
            width: frame.width,
            height: frame.height,
            fps: self.config.video_fps,
        });
        if video.is_none() {
            tracing::warn!("No live frame yet, session will have no video track");
        }
        self.manager.set_video(video);

        match self.manager.start(snapshot_interval_ms).await {
            Ok(id) => {
                self.set_status(format!("Recording session {id}"));
                Ok(())
            }
            Err(e) if e.is_state_conflict() => {
                self.set_status("Recording already in progress".to_string());
                Ok(())
            }
            Err(e) => {
                self.set_status(format!("Failed to start recording: {e}"));
                Err(e)
            }
        }
    }

    /// Stop the current session. Stopping while idle is a notice, not an
    /// error.
    pub async fn stop_recording(&mut self) -> RecorderResult<()> {
        match self.manager.stop().await {
            Ok(files) => {
                self.set_status(format!("Recording stopped ({} files)", files.len()));
                Ok(())
            }
            Err(e) if e.is_state_conflict() => {
                self.set_status("No recording in progress".to_string());
                Ok(())
            }
            Err(e) => {
                self.set_status(format!("Failed to stop recording: {e}"));
                Err(e)
            }
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.manager.state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }

    /// Delete all recorded sessions.
    pub fn purge_recordings(&mut self) -> RecorderResult<usize> {
        match self.manager.purge() {
            Ok(count) => {
                self.set_status(format!("Purged {count} sessions"));
                Ok(count)
            }
            Err(e) if e.is_state_conflict() => {
                self.set_status("Cannot purge while recording".to_string());
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the offline enrichment pass over all recorded snapshots.
    pub fn post_process(&self) -> RecorderResult<usize> {
        if self.manager.state() == SessionState::Recording {
            self.set_status("Cannot post-process while recording".to_string());
            return Ok(0);
        }
        let updated = self.post.run(&self.config.recordings_dir)?;
        self.set_status(format!("Post-processed {updated} snapshots"));
        Ok(updated)
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    pub fn caption(&self) -> String {
        self.state.read_caption()
    }

    /// The track set from the most recent render cycle.
    pub fn tracked_objects(&self) -> Vec<TrackOutput> {
        self.render_loop.tracks()
    }

    /// Stop everything: any active session, the live workers, and the
    /// camera.
    pub async fn shutdown(&mut self) {
        if self.manager.state() == SessionState::Recording {
            if let Err(e) = self.manager.stop().await {
                tracing::error!("Failed to stop session during shutdown: {}", e);
            }
        }
        if let Some(mut worker) = self.detection_worker.take() {
            worker.stop();
        }
        self.render_loop.stop();
        if let Some(mut source) = self.frame_source.take() {
            source.stop();
        }
        self.set_status("Shut down".to_string());
    }

    fn set_status(&self, message: String) {
        tracing::debug!("Status: {}", message);
        *self.status.lock() = message;
    }
}
