//! Collaborator contracts for external inference services
//!
//! The core never loads or configures models itself; it calls these
//! traits and consumes their typed outputs. Every call is a single
//! atomic request that returns a result or fails; failures are logged
//! by the caller and never propagate as fatal.

use crate::detection::Detection;
use crate::error::RecorderResult;
use crate::state::Frame;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Object detector: returns labeled, scored bounding boxes for a frame.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> RecorderResult<Vec<Detection>>;
}

/// Image captioner: returns a short text description of a frame.
pub trait ImageCaptioner: Send + Sync {
    fn caption(&self, frame: &Frame) -> RecorderResult<String>;
}

/// Depth estimator: returns a single-channel depth image for a frame.
pub trait DepthEstimator: Send + Sync {
    fn estimate(&self, frame: &Frame) -> RecorderResult<GrayImage>;
}

/// Face region reported alongside an emotion reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// One detected face with its dominant emotion and per-class scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionReading {
    pub dominant_emotion: String,
    pub emotions: BTreeMap<String, f32>,
    pub region: FaceRegion,
}

/// Emotion classifier: returns one reading per detected face.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> RecorderResult<Vec<EmotionReading>>;
}

/// Keypoint detector: returns (x, y) interest points for a frame.
pub trait KeypointDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> RecorderResult<Vec<[f32; 2]>>;
}

/// Speech-to-text failure kinds, surfaced to the status line verbatim.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("API unavailable")]
    ServiceUnavailable,
    #[error("Unable to recognize speech")]
    Unintelligible,
    #[error("{0}")]
    Other(String),
}

/// Speech-to-text: listens on the microphone and returns a transcript.
pub trait SpeechTranscriber: Send + Sync {
    fn transcribe(&self) -> Result<String, TranscribeError>;
}
