//! Recording session state

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of the recorder as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Recording,
}

/// One recording session on disk.
///
/// The directory name carries the start timestamp so sessions sort
/// chronologically and never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Start time in milliseconds since the epoch; doubles as the id.
    pub id: u64,
    /// Start time in seconds, as written into snapshot metadata.
    pub start_time: f64,
    pub dir: PathBuf,
}

impl Session {
    /// Create a session rooted under `recordings_dir`, stamped now.
    pub fn begin(recordings_dir: &Path) -> Self {
        let now_ms = Utc::now().timestamp_millis() as u64;
        Self {
            id: now_ms,
            start_time: now_ms as f64 / 1000.0,
            dir: recordings_dir.join(format!("session_{now_ms}")),
        }
    }
}

/// Free-text annotations attached to every snapshot of a session.
///
/// Written from the UI or a speech transcription at any time, read by
/// the snapshot serializer on its own schedule.
#[derive(Debug, Default)]
pub struct SessionText {
    instruction: RwLock<String>,
    intent: RwLock<String>,
}

impl SessionText {
    pub fn set_instruction(&self, text: impl Into<String>) {
        *self.instruction.write() = text.into();
    }

    pub fn set_intent(&self, text: impl Into<String>) {
        *self.intent.write() = text.into();
    }

    pub fn instruction(&self) -> String {
        self.instruction.read().clone()
    }

    pub fn intent(&self) -> String {
        self.intent.read().clone()
    }
}

/// Minimum accepted snapshot interval in milliseconds.
pub const MIN_SNAPSHOT_INTERVAL_MS: u64 = 100;
/// Interval substituted when the requested one is below the minimum.
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1000;

/// Coerce a requested snapshot interval into the accepted range.
///
/// Sub-100ms intervals would outpace capture and disk; they fall back to
/// the one-second default rather than failing the session.
pub fn coerce_snapshot_interval(requested_ms: u64) -> u64 {
    if requested_ms < MIN_SNAPSHOT_INTERVAL_MS {
        tracing::warn!(
            "Snapshot interval {}ms below minimum, using {}ms",
            requested_ms,
            DEFAULT_SNAPSHOT_INTERVAL_MS
        );
        DEFAULT_SNAPSHOT_INTERVAL_MS
    } else {
        requested_ms
    }
}
