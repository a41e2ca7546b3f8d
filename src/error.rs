//! Error types and handling
//!
//! Common error types used across the recorder.

use thiserror::Error;

/// Recorder-wide error type.
///
/// Worker-loop-local failures are logged where they occur and never
/// unwind past the loop boundary; only resource-acquisition failures
/// during session start propagate to the caller.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Camera or microphone failed to open. Fatal to the requested
    /// operation; no partial resources are retained.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A collaborator inference call failed. Treated as "no result this
    /// cycle", never fatal.
    #[error("inference failure: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad configuration value that could not be coerced.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `start()` while a session is already active.
    #[error("already recording")]
    AlreadyRecording,

    /// `stop()` while idle.
    #[error("not recording")]
    NotRecording,
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

impl RecorderError {
    /// Whether this error is a start/stop state conflict, reported to
    /// the user as a no-op notice rather than a failure.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            RecorderError::AlreadyRecording | RecorderError::NotRecording
        )
    }
}
