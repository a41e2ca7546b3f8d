//! Detection types and the asynchronous detection worker

pub mod worker;

pub use worker::DetectionWorker;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// One object detection for a single cycle.
///
/// Ephemeral: produced each detection cycle, consumed by the tracker and
/// the render step, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Confidence score in [0, 1].
    pub score: f32,
    /// Bounding box as (x1, y1, x2, y2) pixels.
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }
}

/// Number of joints in the simulated joint-output block.
pub const JOINT_COUNT: usize = 360;

/// Random 360x3 joint data standing in for an externally-sourced pose
/// stream, published alongside each detection cycle.
pub fn simulate_joint_outputs() -> Vec<[f32; 3]> {
    let mut rng = rand::thread_rng();
    (0..JOINT_COUNT)
        .map(|_| [rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()])
        .collect()
}
