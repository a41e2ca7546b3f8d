//! Live caption worker
//!
//! Periodically describes the current frame and publishes the text into
//! the shared state for the status surface. Captioning failures keep the
//! previous caption on screen. Runs for the lifetime of a recording
//! session, wrapped as a channel.

use crate::error::RecorderResult;
use crate::inference::ImageCaptioner;
use crate::session::channel::SessionChannel;
use crate::state::SharedFrameState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct CaptionWorker {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptionWorker {
    pub fn start(
        state: Arc<SharedFrameState>,
        captioner: Arc<dyn ImageCaptioner>,
        interval: Duration,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let handle = std::thread::spawn(move || {
            tracing::info!("Caption worker started");
            while !stop.load(Ordering::SeqCst) {
                run_cycle(&state, captioner.as_ref());
                std::thread::sleep(interval);
            }
            tracing::info!("Caption worker stopped");
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Session channel that runs the caption worker between start and stop.
/// Produces no files of its own; captions land in the shared state and,
/// through it, in the status surface.
pub struct CaptioningChannel {
    id: String,
    state: Arc<SharedFrameState>,
    captioner: Arc<dyn ImageCaptioner>,
    interval: Duration,
    worker: Option<CaptionWorker>,
}

impl CaptioningChannel {
    pub fn new(
        state: Arc<SharedFrameState>,
        captioner: Arc<dyn ImageCaptioner>,
        interval: Duration,
    ) -> Self {
        Self {
            id: "captions".to_string(),
            state,
            captioner,
            interval,
            worker: None,
        }
    }
}

#[async_trait]
impl SessionChannel for CaptioningChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self, _session_dir: &Path) -> RecorderResult<()> {
        Ok(())
    }

    async fn start(&mut self) -> RecorderResult<()> {
        self.worker = Some(CaptionWorker::start(
            self.state.clone(),
            self.captioner.clone(),
            self.interval,
        ));
        Ok(())
    }

    async fn stop(&mut self) -> RecorderResult<()> {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        Ok(())
    }

    fn output_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

fn run_cycle(state: &SharedFrameState, captioner: &dyn ImageCaptioner) {
    let frame = match state.read_frame() {
        Some(f) => f,
        None => return,
    };
    match captioner.caption(&frame) {
        Ok(caption) => state.publish_caption(caption),
        Err(e) => {
            // Keep the previous caption rather than blanking the display.
            tracing::warn!("Captioning failed: {}", e);
        }
    }
}
