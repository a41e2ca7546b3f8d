//! Tracking and render loop
//!
//! Runs continuously at roughly 20Hz: pulls the latest frame and
//! detections, advances the multi-object tracker, publishes the current
//! track set for the UI, and draws track boxes onto the frame. While a
//! session is recording, annotated frames are also fed to the video
//! encoder.

use crate::session::video::VideoEncoder;
use crate::state::SharedFrameState;
use crate::tracker::{SortTracker, TrackOutput, TrackerConfig};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Where the render loop sends annotated frames while recording. Empty
/// outside a session.
pub type EncoderSlot = Arc<RwLock<Option<Arc<VideoEncoder>>>>;

const RENDER_PERIOD: Duration = Duration::from_millis(50);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw hollow rectangles for each track onto the frame, clamped to the
/// image bounds.
pub fn draw_tracks(image: &mut RgbImage, tracks: &[TrackOutput]) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    for track in tracks {
        let x1 = track.bbox[0].clamp(0.0, w - 1.0);
        let y1 = track.bbox[1].clamp(0.0, h - 1.0);
        let x2 = track.bbox[2].clamp(0.0, w - 1.0);
        let y2 = track.bbox[3].clamp(0.0, h - 1.0);
        let rect_w = (x2 - x1).max(1.0) as u32;
        let rect_h = (y2 - y1).max(1.0) as u32;
        draw_hollow_rect_mut(
            image,
            Rect::at(x1 as i32, y1 as i32).of_size(rect_w, rect_h),
            BOX_COLOR,
        );
    }
}

/// Owns the tracker and the periodic annotate/encode cycle.
pub struct RenderLoop {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    latest_tracks: Arc<Mutex<Vec<TrackOutput>>>,
}

impl RenderLoop {
    pub fn start(
        state: Arc<SharedFrameState>,
        tracker_config: TrackerConfig,
        encoder_slot: EncoderSlot,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();
        let latest_tracks = Arc::new(Mutex::new(Vec::new()));
        let tracks_out = latest_tracks.clone();

        let handle = std::thread::spawn(move || {
            let mut tracker = SortTracker::new(tracker_config);
            tracing::info!("Render loop started");

            while !stop.load(Ordering::SeqCst) {
                run_cycle(&state, &mut tracker, &tracks_out, &encoder_slot);
                std::thread::sleep(RENDER_PERIOD);
            }
            tracing::info!("Render loop stopped");
        });

        Self {
            stop_flag,
            handle: Some(handle),
            latest_tracks,
        }
    }

    /// The track set from the most recent cycle.
    pub fn tracks(&self) -> Vec<TrackOutput> {
        self.latest_tracks.lock().clone()
    }

    /// Shared handle to the latest track set for the control surface.
    pub fn tracks_handle(&self) -> Arc<Mutex<Vec<TrackOutput>>> {
        self.latest_tracks.clone()
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_cycle(
    state: &SharedFrameState,
    tracker: &mut SortTracker,
    latest_tracks: &Mutex<Vec<TrackOutput>>,
    encoder_slot: &EncoderSlot,
) {
    let frame = match state.read_frame() {
        Some(f) => f,
        None => return,
    };

    let detections = state.read_detections();
    let tracks = tracker.update(&detections);
    *latest_tracks.lock() = tracks.clone();

    // Skip the annotation work entirely when nobody consumes the frame.
    let encoder = encoder_slot.read().clone();
    let Some(encoder) = encoder else {
        return;
    };

    let Some(mut image) = RgbImage::from_raw(frame.width, frame.height, frame.data) else {
        tracing::debug!("Frame buffer does not match dimensions, skipping render");
        return;
    };
    draw_tracks(&mut image, &tracks);

    if let Err(e) = encoder.write_frame(image.as_raw()) {
        tracing::warn!("Failed to write frame to encoder: {}", e);
    }
}
