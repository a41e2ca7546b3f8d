//! Recording channel abstraction
//!
//! Every artifact a session produces (audio track, video track, snapshot
//! stream) is driven by one channel. The manager initializes all channels
//! against the session directory, starts them together, and stops them
//! together; a channel that fails to start aborts the whole session.

use crate::error::RecorderResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait SessionChannel: Send {
    /// Stable identifier used in logs and error reports.
    fn id(&self) -> &str;

    /// Prepare the channel to write into `session_dir`. Called once per
    /// session, before `start`. Device probing belongs here so an
    /// unavailable device fails the session before anything is written.
    async fn initialize(&mut self, session_dir: &Path) -> RecorderResult<()>;

    /// Begin capturing. The channel owns its worker from here until
    /// `stop` returns.
    async fn start(&mut self) -> RecorderResult<()>;

    /// Stop capturing and flush. Must be idempotent; stopping a channel
    /// that never started is a no-op.
    async fn stop(&mut self) -> RecorderResult<()>;

    /// Files this channel has produced, for the session summary.
    fn output_files(&self) -> Vec<PathBuf>;
}
