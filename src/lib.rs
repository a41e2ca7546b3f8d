//! Data Recorder - synchronized multi-modal recording sessions.
//!
//! Captures live camera frames, runs asynchronous object detection and
//! tracking over them, and records sessions that bundle a video track,
//! an audio track, and periodic annotated snapshots with JSON metadata.

pub mod capture;
pub mod controller;
pub mod detection;
pub mod error;
pub mod inference;
pub mod postprocess;
pub mod session;
pub mod state;
pub mod tracker;

pub use controller::{Collaborators, RecorderConfig, RecorderController};
pub use error::{RecorderError, RecorderResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries embedding the recorder.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Data recorder v{}", env!("CARGO_PKG_VERSION"));
}
