//! Device capture
//!
//! Camera frame acquisition (nokhwa) and microphone recording (cpal).

pub mod audio;
pub mod frame_source;

pub use audio::AudioRecorder;
pub use frame_source::{list_cameras, CameraInfo, FrameSource};
