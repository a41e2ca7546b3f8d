//! Recording sessions
//!
//! State machine, channel abstraction, and the per-session artifact
//! writers: audio (see `capture::audio`), video, and periodic snapshots.

pub mod caption;
pub mod channel;
pub mod manager;
pub mod render;
pub mod snapshot;
pub mod state;
pub mod video;

pub use caption::CaptioningChannel;
pub use channel::SessionChannel;
pub use manager::{SessionEvent, SessionManager};
pub use render::{EncoderSlot, RenderLoop};
pub use snapshot::{SnapshotMetadata, SnapshotSerializer};
pub use state::{Session, SessionState, SessionText};
pub use video::{VideoConfig, VideoEncoder};
