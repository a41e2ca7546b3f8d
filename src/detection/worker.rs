//! Background detection worker
//!
//! Periodically runs the external object detector against the latest
//! frame and publishes filtered results into the shared state, so the
//! render loop can overlay bounding boxes without blocking on inference.

use crate::detection::simulate_joint_outputs;
use crate::inference::ObjectDetector;
use crate::state::{ConfidenceThreshold, SharedFrameState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Periodic detection task with a stop-then-join shutdown contract.
///
/// Runs at its own fixed period, independent of (and typically slower
/// than) the camera's frame rate.
pub struct DetectionWorker {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    /// Spawn the worker loop.
    pub fn start(
        state: Arc<SharedFrameState>,
        detector: Arc<dyn ObjectDetector>,
        threshold: Arc<ConfidenceThreshold>,
        interval: Duration,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let handle = std::thread::spawn(move || {
            tracing::info!("Detection worker started (period {:?})", interval);

            // Stop flag is checked once per iteration; a blocking
            // inference call delays shutdown by at most one cycle.
            while !stop.load(Ordering::SeqCst) {
                run_cycle(&state, detector.as_ref(), &threshold);
                std::thread::sleep(interval);
            }

            tracing::info!("Detection worker stopped");
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and block until it has exited.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One detection cycle: read the latest frame, run the detector, filter
/// by the live confidence threshold, publish.
///
/// No frame yet → no-op. Inference error → publish nothing, so the
/// prior results stay visible (stale-but-valid beats blank).
fn run_cycle(
    state: &SharedFrameState,
    detector: &dyn ObjectDetector,
    threshold: &ConfidenceThreshold,
) {
    let Some(frame) = state.read_frame() else {
        return;
    };

    match detector.detect(&frame) {
        Ok(detections) => {
            let min_score = threshold.get();
            let filtered: Vec<_> = detections
                .into_iter()
                .filter(|d| d.score >= min_score)
                .collect();
            tracing::debug!("Detection cycle: {} objects kept", filtered.len());
            state.publish_detections(filtered, simulate_joint_outputs());
        }
        Err(e) => {
            tracing::warn!("Detection cycle failed, keeping prior results: {e}");
        }
    }
}
