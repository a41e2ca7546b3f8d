//! Periodic snapshot serializer
//!
//! While a session records, this channel wakes on its interval, grabs the
//! latest shared frame, and writes one snapshot directory: the clean
//! camera image, an annotated copy when objects are being tracked, an
//! optional depth map, and a JSON metadata document tying the snapshot
//! to the session's audio/video tracks.

use crate::detection::{simulate_joint_outputs, JOINT_COUNT};
use crate::error::{RecorderError, RecorderResult};
use crate::inference::DepthEstimator;
use crate::postprocess::PostProcessing;
use crate::session::channel::SessionChannel;
use crate::session::render::draw_tracks;
use crate::session::state::SessionText;
use crate::state::SharedFrameState;
use crate::tracker::TrackOutput;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Back-reference from a snapshot to its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingData {
    /// Session start, seconds since the epoch.
    pub start_time: f64,
}

/// The JSON document written alongside every snapshot image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: u64,
    pub recording_data: RecordingData,
    /// Snapshot capture time, unix milliseconds.
    pub timestamp: u64,
    pub instruction: String,
    pub intent: String,
    /// Session-relative path of the audio track.
    pub audio: String,
    /// Session-relative path of the video track.
    pub video: String,
    pub joint_outputs: Vec<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_processing: Option<PostProcessing>,
}

/// Channel that serializes periodic snapshots into the session directory.
pub struct SnapshotSerializer {
    id: String,
    state: Arc<SharedFrameState>,
    text: Arc<SessionText>,
    depth: Option<Arc<dyn DepthEstimator>>,
    /// Latest track set from the render loop, for the annotated image.
    tracks: Arc<Mutex<Vec<TrackOutput>>>,
    interval_ms: Arc<AtomicU64>,
    session_dir: Option<PathBuf>,
    session_start_time: f64,
    /// Sequential snapshot ids; bumped only once a snapshot's artifacts
    /// are fully on disk, so skipped and failed ticks leave no gaps.
    next_id: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotSerializer {
    pub fn new(
        state: Arc<SharedFrameState>,
        text: Arc<SessionText>,
        depth: Option<Arc<dyn DepthEstimator>>,
        tracks: Arc<Mutex<Vec<TrackOutput>>>,
        interval_ms: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id: "snapshots".to_string(),
            state,
            text,
            depth,
            tracks,
            interval_ms,
            session_dir: None,
            session_start_time: 0.0,
            next_id: Arc::new(AtomicU64::new(0)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Capture one snapshot now. Returns the metadata path, or `None`
    /// when no frame has been published yet.
    pub fn take_snapshot(&self) -> RecorderResult<Option<PathBuf>> {
        let session_dir = self.session_dir.as_ref().ok_or_else(|| {
            RecorderError::Configuration("snapshot channel not initialized".to_string())
        })?;

        let frame = match self.state.read_frame() {
            Some(f) => f,
            None => return Ok(None),
        };

        let snapshot_id = self.next_id.load(Ordering::SeqCst);
        let mut now_ms = Utc::now().timestamp_millis() as u64;
        let mut snapshot_dir = session_dir.join(format!("snapshot_{now_ms}"));
        // Two ticks inside one millisecond must not share a directory;
        // walk the timestamp forward until the name is free.
        while snapshot_dir.exists() {
            now_ms += 1;
            snapshot_dir = session_dir.join(format!("snapshot_{now_ms}"));
        }
        std::fs::create_dir_all(&snapshot_dir)?;

        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                RecorderError::Configuration("frame buffer does not match dimensions".to_string())
            })?;
        image
            .save(snapshot_dir.join("clean_image.jpg"))
            .map_err(|e| RecorderError::Io(std::io::Error::other(e.to_string())))?;

        let tracks = self.tracks.lock().clone();
        if !tracks.is_empty() {
            let mut annotated = image.clone();
            draw_tracks(&mut annotated, &tracks);
            if let Err(e) = annotated.save(snapshot_dir.join("annotated_image.jpg")) {
                tracing::warn!("Failed to write annotated image: {}", e);
            }
        }

        if let Some(depth) = &self.depth {
            match depth.estimate(&frame) {
                Ok(depth_map) => {
                    if let Err(e) = depth_map.save(snapshot_dir.join("depth_map.jpg")) {
                        tracing::warn!("Failed to write depth map: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Depth estimation failed: {}", e),
            }
        }

        let mut joint_outputs = self.state.read_joints();
        if joint_outputs.len() != JOINT_COUNT {
            joint_outputs = simulate_joint_outputs();
        }

        let metadata = SnapshotMetadata {
            snapshot_id,
            recording_data: RecordingData {
                start_time: self.session_start_time,
            },
            timestamp: now_ms,
            instruction: self.text.instruction(),
            intent: self.text.intent(),
            audio: "audio.wav".to_string(),
            video: "video.mp4".to_string(),
            joint_outputs,
            post_processing: None,
        };

        let metadata_path = snapshot_dir.join(format!("data_{now_ms}.json"));
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        // The id is consumed only now that every artifact is on disk; a
        // tick failing anywhere above leaves the sequence gapless.
        self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Snapshot {} -> {}", snapshot_id, snapshot_dir.display());
        Ok(Some(metadata_path))
    }
}

#[async_trait]
impl SessionChannel for SnapshotSerializer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self, session_dir: &Path) -> RecorderResult<()> {
        // The directory name carries the session start timestamp.
        let start_ms = session_dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("session_"))
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or_else(|| Utc::now().timestamp_millis() as u64);

        self.session_dir = Some(session_dir.to_path_buf());
        self.session_start_time = start_ms as f64 / 1000.0;
        self.next_id.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&mut self) -> RecorderResult<()> {
        if self.handle.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let worker = SnapshotWorker {
            serializer: SnapshotSerializer {
                id: self.id.clone(),
                state: self.state.clone(),
                text: self.text.clone(),
                depth: self.depth.clone(),
                tracks: self.tracks.clone(),
                interval_ms: self.interval_ms.clone(),
                session_dir: self.session_dir.clone(),
                session_start_time: self.session_start_time,
                next_id: self.next_id.clone(),
                stop_flag: self.stop_flag.clone(),
                handle: None,
            },
            stop_flag: self.stop_flag.clone(),
            interval_ms: self.interval_ms.clone(),
        };
        self.handle = Some(std::thread::spawn(move || worker.run()));
        Ok(())
    }

    async fn stop(&mut self) -> RecorderResult<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.session_dir.iter().cloned().collect()
    }
}

struct SnapshotWorker {
    serializer: SnapshotSerializer,
    stop_flag: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
}

impl SnapshotWorker {
    fn run(self) {
        tracing::info!("Snapshot serializer started");
        'outer: loop {
            // Sleep in short slices so stop stays responsive even with
            // multi-second intervals.
            let interval = self.interval_ms.load(Ordering::SeqCst);
            let mut slept = 0_u64;
            while slept < interval {
                if self.stop_flag.load(Ordering::SeqCst) {
                    break 'outer;
                }
                let slice = (interval - slept).min(50);
                std::thread::sleep(Duration::from_millis(slice));
                slept += slice;
            }

            match self.serializer.take_snapshot() {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!("No frame available, snapshot skipped"),
                Err(e) => tracing::warn!("Snapshot failed: {}", e),
            }
        }
        tracing::info!("Snapshot serializer stopped");
    }
}
