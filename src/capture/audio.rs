//! Microphone capture using cpal
//!
//! Records the default input device into a buffer for the lifetime of a
//! session and flushes it to a WAV file (hound) during the worker's own
//! stop handling, before `stop` returns to the caller.

use crate::error::{RecorderError, RecorderResult};
use crate::session::channel::SessionChannel;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::Mutex as ParkingMutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

/// Encode PCM samples to a 16-bit WAV file.
pub fn write_wav(
    path: &Path,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> RecorderResult<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| RecorderError::Io(std::io::Error::other(e.to_string())))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| RecorderError::Io(std::io::Error::other(e.to_string())))?;
    }
    writer
        .finalize()
        .map_err(|e| RecorderError::Io(std::io::Error::other(e.to_string())))?;
    Ok(())
}

/// Microphone recording channel.
///
/// Samples are buffered in memory for the session and written out as
/// `audio.wav` when the worker loop exits.
pub struct AudioRecorder {
    id: String,
    is_recording: Arc<AtomicBool>,
    output_path: Option<PathBuf>,
    samples: Arc<ParkingMutex<Vec<i16>>>,
    handle: Option<JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl AudioRecorder {
    pub fn new() -> Self {
        Self {
            id: "audio".to_string(),
            is_recording: Arc::new(AtomicBool::new(false)),
            output_path: None,
            samples: Arc::new(ParkingMutex::new(Vec::new())),
            handle: None,
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

impl Default for AudioRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionChannel for AudioRecorder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self, session_dir: &Path) -> RecorderResult<()> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            RecorderError::DeviceUnavailable("no default microphone".to_string())
        })?;
        let config = device.default_input_config().map_err(|e| {
            RecorderError::DeviceUnavailable(format!("microphone config: {e}"))
        })?;

        self.sample_rate = config.sample_rate().0;
        self.channels = config.channels();
        self.output_path = Some(session_dir.join("audio.wav"));

        tracing::info!(
            "Audio channel initialized: {} ({}Hz, {}ch)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            self.sample_rate,
            self.channels
        );
        Ok(())
    }

    async fn start(&mut self) -> RecorderResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }
        let output_path = self.output_path.clone().ok_or_else(|| {
            RecorderError::Configuration("audio output path not set".to_string())
        })?;

        self.samples.lock().clear();
        self.is_recording.store(true, Ordering::SeqCst);

        let is_recording = self.is_recording.clone();
        let samples = self.samples.clone();
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        // The cpal stream is not Send; it lives on this thread, which
        // also owns the flush to disk after the loop exits. The channel
        // reports whether the stream actually opened, so a failure here
        // surfaces from start() instead of dying in a log line.
        let (open_tx, open_rx) = mpsc::channel::<Result<(), String>>();
        let handle = std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = match host.default_input_device() {
                Some(d) => d,
                None => {
                    let _ = open_tx.send(Err("microphone disappeared before capture start".to_string()));
                    return;
                }
            };

            let stream_config = StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let callback_samples = samples.clone();
            let is_rec = is_recording.clone();
            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_rec.load(Ordering::Relaxed) {
                        let mut buf = callback_samples.lock();
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                |err| tracing::error!("Audio stream error: {}", err),
                None,
            );

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = open_tx.send(Err(format!("failed to build input stream: {e}")));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = open_tx.send(Err(format!("failed to start audio stream: {e}")));
                return;
            }
            let _ = open_tx.send(Ok(()));
            tracing::info!("Audio capture started");

            while is_recording.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            drop(stream);

            // Flush buffered audio before the join in stop() returns.
            let buffered = samples.lock().clone();
            match write_wav(&output_path, &buffered, sample_rate, channels) {
                Ok(()) => tracing::info!(
                    "Audio flushed: {} samples to {}",
                    buffered.len(),
                    output_path.display()
                ),
                Err(e) => tracing::error!("Failed to write audio file: {}", e),
            }
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(msg)) => {
                self.is_recording.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(RecorderError::DeviceUnavailable(msg))
            }
            Err(_) => {
                self.is_recording.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(RecorderError::DeviceUnavailable(
                    "audio capture thread exited during start".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> RecorderResult<()> {
        if !self.is_recording.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.is_recording.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        tracing::info!("Audio capture stopped");
        Ok(())
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_path
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn wav_flush_produces_nonempty_readable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.wav");

        // One second of a quiet ramp.
        let samples: Vec<i16> = (0..44_100).map(|i| (i % 128) as i16).collect();
        write_wav(&path, &samples, 44_100, 1).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert!(len > 0, "audio.wav must have a non-zero byte length");

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.samples::<i16>().count(), samples.len());
    }

    #[test]
    fn wav_flush_of_empty_buffer_still_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        write_wav(&path, &[], 44_100, 1).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn failed_start_retains_no_partial_state() {
        // start() before initialize() must fail synchronously and leave
        // the channel idle: stop() is a no-op and no outputs are claimed.
        let mut recorder = AudioRecorder::new();
        assert!(recorder.start().await.is_err());
        assert!(!recorder.is_recording.load(Ordering::SeqCst));
        recorder.stop().await.unwrap();
        assert!(recorder.output_files().is_empty());
    }
}
