//! Session video track
//!
//! Raw RGB frames are piped into an FFmpeg child process over stdin and
//! encoded to H.264 as they arrive, so stopping a session leaves a
//! finished MP4 rather than an intermediate dump.

use crate::error::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

/// Dimensions and rate of the encoded video track.
#[derive(Debug, Clone, Copy)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// FFmpeg-backed encoder for one session's `video.mp4`.
pub struct VideoEncoder {
    config: VideoConfig,
    output_path: PathBuf,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    running: AtomicBool,
    frame_count: Mutex<u64>,
}

impl VideoEncoder {
    /// Spawn FFmpeg ready to receive raw RGB frames.
    pub fn start(session_dir: &Path, config: VideoConfig) -> RecorderResult<Self> {
        let output_path = session_dir.join("video.mp4");

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                &format!("{}x{}", config.width, config.height),
                "-framerate",
                &config.fps.to_string(),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-crf",
                "18",
                "-movflags",
                "+faststart",
            ])
            .arg(&output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                RecorderError::Configuration(format!("failed to spawn ffmpeg: {e}"))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RecorderError::Configuration("ffmpeg stdin not available".to_string())
        })?;

        tracing::info!(
            "Video encoder started: {}x{} @ {}fps -> {}",
            config.width,
            config.height,
            config.fps,
            output_path.display()
        );

        Ok(Self {
            config,
            output_path,
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            running: AtomicBool::new(true),
            frame_count: Mutex::new(0),
        })
    }

    /// Feed one raw RGB frame. Frames of the wrong size are dropped
    /// rather than corrupting the stream.
    pub fn write_frame(&self, rgb_data: &[u8]) -> RecorderResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let expected = (self.config.width * self.config.height * 3) as usize;
        if rgb_data.len() != expected {
            tracing::debug!(
                "Dropping frame with unexpected size {} (expected {})",
                rgb_data.len(),
                expected
            );
            return Ok(());
        }

        let mut stdin = self.stdin.lock();
        if let Some(stdin) = stdin.as_mut() {
            stdin.write_all(rgb_data)?;
            *self.frame_count.lock() += 1;
        }
        Ok(())
    }

    /// Close the pipe and wait for FFmpeg to finalize the file.
    pub fn finish(&self) -> RecorderResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Dropping stdin sends EOF; ffmpeg then flushes and exits.
        self.stdin.lock().take();

        if let Some(mut child) = self.child.lock().take() {
            let status = child.wait()?;
            let frames = *self.frame_count.lock();
            if status.success() {
                tracing::info!(
                    "Video encoder finished: {} frames -> {}",
                    frames,
                    self.output_path.display()
                );
            } else {
                tracing::error!("ffmpeg exited with status {}", status);
            }
        }
        Ok(())
    }

    pub fn config(&self) -> VideoConfig {
        self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.finish();
        }
    }
}
