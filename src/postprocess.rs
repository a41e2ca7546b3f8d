//! Offline enrichment of recorded snapshots
//!
//! After recording, a second pass walks the recordings directory and
//! augments each snapshot's metadata with whatever analyzers are
//! available. The pass is idempotent: re-running it replaces the
//! `post_processing` block rather than duplicating it.

use crate::detection::Detection;
use crate::error::RecorderResult;
use crate::inference::{EmotionClassifier, EmotionReading, KeypointDetector, ObjectDetector};
use crate::session::snapshot::SnapshotMetadata;
use crate::state::Frame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Analysis results attached to a snapshot after recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessing {
    pub detected_objects: Vec<Detection>,
    pub emotions: Vec<EmotionReading>,
    pub keypoints: Vec<[f32; 2]>,
}

/// The analyzers the enrichment pass runs. Each is optional; absent
/// analyzers leave their field empty rather than failing the pass.
#[derive(Default, Clone)]
pub struct PostProcessors {
    pub detector: Option<Arc<dyn ObjectDetector>>,
    pub emotion: Option<Arc<dyn EmotionClassifier>>,
    pub keypoints: Option<Arc<dyn KeypointDetector>>,
}

impl PostProcessors {
    /// Enrich every snapshot under `recordings_dir`. Returns the number
    /// of snapshots updated.
    pub fn run(&self, recordings_dir: &Path) -> RecorderResult<usize> {
        if !recordings_dir.exists() {
            return Ok(0);
        }
        let mut updated = 0;
        for session in sorted_dirs(recordings_dir, "session_")? {
            for snapshot in sorted_dirs(&session, "snapshot_")? {
                match self.process_snapshot(&snapshot) {
                    Ok(true) => updated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            "Skipping snapshot {}: {}",
                            snapshot.display(),
                            e
                        );
                    }
                }
            }
        }
        tracing::info!("Post-processing updated {} snapshots", updated);
        Ok(updated)
    }

    /// Enrich one snapshot directory. Returns false when the snapshot is
    /// incomplete (missing image or metadata).
    fn process_snapshot(&self, snapshot_dir: &Path) -> RecorderResult<bool> {
        let image_path = snapshot_dir.join("clean_image.jpg");
        let metadata_path = match find_metadata(snapshot_dir)? {
            Some(p) => p,
            None => return Ok(false),
        };
        if !image_path.exists() {
            return Ok(false);
        }

        let mut metadata: SnapshotMetadata =
            serde_json::from_str(&std::fs::read_to_string(&metadata_path)?)?;

        let rgb = image::open(&image_path)
            .map_err(|e| {
                crate::error::RecorderError::Io(std::io::Error::other(e.to_string()))
            })?
            .to_rgb8();
        let frame = Frame {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
            timestamp_ms: metadata.timestamp,
        };

        let mut result = PostProcessing::default();
        if let Some(detector) = &self.detector {
            match detector.detect(&frame) {
                Ok(objects) => result.detected_objects = objects,
                Err(e) => tracing::warn!("Object detection failed: {}", e),
            }
        }
        if let Some(emotion) = &self.emotion {
            match emotion.classify(&frame) {
                Ok(readings) => result.emotions = readings,
                Err(e) => tracing::warn!("Emotion classification failed: {}", e),
            }
        }
        if let Some(keypoints) = &self.keypoints {
            match keypoints.detect(&frame) {
                Ok(points) => result.keypoints = points,
                Err(e) => tracing::warn!("Keypoint detection failed: {}", e),
            }
        }

        metadata.post_processing = Some(result);
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        Ok(true)
    }
}

fn sorted_dirs(parent: &Path, prefix: &str) -> RecorderResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        let path = entry.path();
        let is_match = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix));
        if is_match {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn find_metadata(snapshot_dir: &Path) -> RecorderResult<Option<PathBuf>> {
    for entry in std::fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("data_") && n.ends_with(".json"));
        if is_match {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::snapshot::RecordingData;
    use tempfile::tempdir;

    struct OneBox;
    impl ObjectDetector for OneBox {
        fn detect(&self, _frame: &Frame) -> RecorderResult<Vec<Detection>> {
            Ok(vec![Detection::new("cup", 0.9, [1.0, 2.0, 3.0, 4.0])])
        }
    }

    fn write_snapshot(session_dir: &Path, ts_ms: u64, with_image: bool) -> PathBuf {
        let snapshot_dir = session_dir.join(format!("snapshot_{ts_ms}"));
        std::fs::create_dir_all(&snapshot_dir).unwrap();
        if with_image {
            image::RgbImage::new(4, 4)
                .save(snapshot_dir.join("clean_image.jpg"))
                .unwrap();
        }
        let metadata = SnapshotMetadata {
            snapshot_id: 0,
            recording_data: RecordingData { start_time: 1.0 },
            timestamp: ts_ms,
            instruction: String::new(),
            intent: String::new(),
            audio: "audio.wav".to_string(),
            video: "video.mp4".to_string(),
            joint_outputs: vec![],
            post_processing: None,
        };
        let path = snapshot_dir.join(format!("data_{ts_ms}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&metadata).unwrap()).unwrap();
        path
    }

    #[test]
    fn enriches_complete_snapshots_and_skips_incomplete() {
        let dir = tempdir().unwrap();
        let session_dir = dir.path().join("session_1000");
        std::fs::create_dir_all(&session_dir).unwrap();
        let complete = write_snapshot(&session_dir, 1100, true);
        let incomplete = write_snapshot(&session_dir, 1200, false);

        let processors = PostProcessors {
            detector: Some(Arc::new(OneBox)),
            ..Default::default()
        };
        assert_eq!(processors.run(dir.path()).unwrap(), 1);

        let enriched: SnapshotMetadata =
            serde_json::from_str(&std::fs::read_to_string(&complete).unwrap()).unwrap();
        let post = enriched.post_processing.unwrap();
        assert_eq!(post.detected_objects.len(), 1);
        assert_eq!(post.detected_objects[0].label, "cup");
        assert!(post.emotions.is_empty());

        let skipped: SnapshotMetadata =
            serde_json::from_str(&std::fs::read_to_string(&incomplete).unwrap()).unwrap();
        assert!(skipped.post_processing.is_none());
    }

    #[test]
    fn rerunning_replaces_rather_than_duplicates() {
        let dir = tempdir().unwrap();
        let session_dir = dir.path().join("session_1000");
        std::fs::create_dir_all(&session_dir).unwrap();
        let path = write_snapshot(&session_dir, 1100, true);

        let processors = PostProcessors {
            detector: Some(Arc::new(OneBox)),
            ..Default::default()
        };
        processors.run(dir.path()).unwrap();
        processors.run(dir.path()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.matches("post_processing").count(), 1);
        let metadata: SnapshotMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(metadata.post_processing.unwrap().detected_objects.len(), 1);
    }

    #[test]
    fn missing_recordings_dir_is_a_noop() {
        let processors = PostProcessors::default();
        assert_eq!(
            processors.run(Path::new("/nonexistent/recordings")).unwrap(),
            0
        );
    }
}
