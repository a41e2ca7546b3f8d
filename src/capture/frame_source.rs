//! Camera frame source using nokhwa
//!
//! Continuously pulls frames from the capture device at its native rate
//! and publishes each one into the shared frame state.

use crate::error::{RecorderError, RecorderResult};
use crate::state::{Frame, SharedFrameState};
use chrono::Utc;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
}

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Continuous capture loop feeding `SharedFrameState`.
///
/// The camera lives entirely on the capture thread; `start` waits for
/// the device to open so an unavailable camera fails the call instead of
/// silently producing nothing.
pub struct FrameSource {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    camera_index: u32,
}

impl FrameSource {
    /// Open camera `camera_index` and start publishing frames.
    ///
    /// Returns `DeviceUnavailable` if the device cannot be opened; the
    /// capture loop is never entered in that case.
    pub fn start(camera_index: u32, state: Arc<SharedFrameState>) -> RecorderResult<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();
        let (open_tx, open_rx) = mpsc::channel::<Result<(), String>>();

        let handle = std::thread::spawn(move || {
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

            let mut camera = match Camera::new(CameraIndex::Index(camera_index), format) {
                Ok(c) => c,
                Err(e) => {
                    let _ = open_tx.send(Err(format!("camera {camera_index}: {e}")));
                    return;
                }
            };
            if let Err(e) = camera.open_stream() {
                let _ = open_tx.send(Err(format!("camera {camera_index} stream: {e}")));
                return;
            }

            let camera_format = camera.camera_format();
            tracing::info!(
                "Camera {} opened: {}x{} @ {}fps",
                camera_index,
                camera_format.resolution().width(),
                camera_format.resolution().height(),
                camera_format.frame_rate()
            );
            let _ = open_tx.send(Ok(()));

            // Stop flag is observed once per iteration; a blocking read
            // delays shutdown by at most one frame interval.
            while !stop.load(Ordering::SeqCst) {
                match camera.frame() {
                    Ok(buffer) => match buffer.decode_image::<RgbFormat>() {
                        Ok(decoded) => {
                            let frame = Frame {
                                width: decoded.width(),
                                height: decoded.height(),
                                data: decoded.into_raw(),
                                timestamp_ms: Utc::now().timestamp_millis() as u64,
                            };
                            state.publish_frame(frame);
                        }
                        Err(e) => {
                            tracing::debug!("Failed to decode frame: {:?}", e);
                        }
                    },
                    Err(e) => {
                        // Capture devices transiently drop frames; retry
                        // on the next cycle.
                        tracing::debug!("Failed to capture frame: {:?}", e);
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            tracing::info!("Camera {} capture loop stopped", camera_index);
        });

        match open_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_flag,
                handle: Some(handle),
                camera_index,
            }),
            Ok(Err(msg)) => {
                let _ = handle.join();
                Err(RecorderError::DeviceUnavailable(msg))
            }
            Err(_) => {
                let _ = handle.join();
                Err(RecorderError::DeviceUnavailable(format!(
                    "camera {camera_index}: capture thread exited during open"
                )))
            }
        }
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }

    /// Signal the loop to stop and block until the device is released.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
