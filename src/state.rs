//! Shared live-frame state
//!
//! One mutex-guarded holder for the most recent captured frame and the
//! most recent detection/annotation results. The frame source, the
//! detection worker, and the captioning worker publish into it; the
//! render loop and the snapshot serializer read from it.
//!
//! Every read returns a defensive copy and every publish stores an owned
//! value, so no consumer ever holds a reference into the live buffer and
//! nothing blocks inside the critical section beyond the copy itself.

use crate::detection::Detection;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// An immutable snapshot of one captured camera frame.
///
/// Pixels are tightly-packed RGB8, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time, unix milliseconds.
    pub timestamp_ms: u64,
}

impl Frame {
    /// Expected buffer length for the frame dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Default)]
struct Inner {
    frame: Option<Frame>,
    detections: Vec<Detection>,
    joints: Vec<[f32; 3]>,
    caption: String,
}

/// Mutex-guarded holder for the live frame and the latest per-cycle
/// detection results.
///
/// The frame and the detection set are allowed to come from different,
/// unsynchronized cycles; the holder guarantees freshness of each
/// individually, not frame/detection alignment.
#[derive(Default)]
pub struct SharedFrameState {
    inner: Mutex<Inner>,
}

impl SharedFrameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the most recent captured frame, replacing the previous one.
    pub fn publish_frame(&self, frame: Frame) {
        self.inner.lock().frame = Some(frame);
    }

    /// Copy out the most recent frame, or `None` before the first capture.
    /// Never blocks waiting for a frame to arrive.
    pub fn read_frame(&self) -> Option<Frame> {
        self.inner.lock().frame.clone()
    }

    /// Publish one detection cycle's filtered results plus the auxiliary
    /// per-cycle joint outputs.
    pub fn publish_detections(&self, detections: Vec<Detection>, joints: Vec<[f32; 3]>) {
        let mut inner = self.inner.lock();
        inner.detections = detections;
        inner.joints = joints;
    }

    /// Copy out the most recently published detection set.
    pub fn read_detections(&self) -> Vec<Detection> {
        self.inner.lock().detections.clone()
    }

    /// Copy out the most recently published joint outputs.
    pub fn read_joints(&self) -> Vec<[f32; 3]> {
        self.inner.lock().joints.clone()
    }

    /// Publish the latest image caption.
    pub fn publish_caption(&self, caption: String) {
        self.inner.lock().caption = caption;
    }

    /// Copy out the latest image caption (empty before the first one).
    pub fn read_caption(&self) -> String {
        self.inner.lock().caption.clone()
    }
}

/// Process-wide detection confidence threshold in [0, 1].
///
/// Mutable from the control surface, read by the detection worker.
/// Last-write-wins; a single atomic word, no further synchronization.
pub struct ConfidenceThreshold {
    bits: AtomicU32,
}

impl ConfidenceThreshold {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.bits
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_frame(fill: u8) -> Frame {
        Frame {
            data: vec![fill; 4 * 4 * 3],
            width: 4,
            height: 4,
            timestamp_ms: fill as u64,
        }
    }

    #[test]
    fn read_frame_is_absent_before_first_publish() {
        let state = SharedFrameState::new();
        assert!(state.read_frame().is_none());
    }

    #[test]
    fn read_returns_defensive_copy() {
        let state = SharedFrameState::new();
        state.publish_frame(test_frame(7));

        let mut copy = state.read_frame().unwrap();
        copy.data[0] = 99;

        // Mutating the copy must not affect the published frame.
        assert_eq!(state.read_frame().unwrap().data[0], 7);
    }

    #[test]
    fn concurrent_publish_never_yields_partial_frame() {
        let state = Arc::new(SharedFrameState::new());
        let writer_state = state.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..500u32 {
                writer_state.publish_frame(test_frame((i % 256) as u8));
            }
        });

        for _ in 0..500 {
            if let Some(frame) = state.read_frame() {
                // A reader's copy is always a fully-formed prior publish:
                // every byte matches the frame's own fill value.
                let fill = frame.data[0];
                assert!(frame.data.iter().all(|&b| b == fill));
                assert_eq!(frame.data.len(), frame.expected_len());
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn threshold_is_clamped() {
        let t = ConfidenceThreshold::new(1.5);
        assert_eq!(t.get(), 1.0);
        t.set(-0.2);
        assert_eq!(t.get(), 0.0);
        t.set(0.35);
        assert!((t.get() - 0.35).abs() < f32::EPSILON);
    }
}
