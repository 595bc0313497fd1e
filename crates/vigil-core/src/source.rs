//! Descriptor source contract.
//!
//! Face detection and descriptor extraction happen outside this crate
//! (camera, model loading, detector fallback). The core only sees what a
//! source hands back: one descriptor per detected face plus the detector's
//! confidence.

use serde::{Deserialize, Serialize};

use crate::types::Descriptor;

/// A single detected face as reported by a descriptor source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub descriptor: Descriptor,
    /// Detector confidence in [0, 1], if the source reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Detection {
    /// Quality to enroll this detection with. Unscored detections get 0.0,
    /// so they never displace a scored sample from a full record.
    pub fn quality(&self) -> f32 {
        self.confidence.unwrap_or(0.0)
    }
}

/// Anything that turns a capture into descriptors.
pub trait DescriptorSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Capture once and return every face found (possibly none).
    fn capture(&mut self) -> Result<Vec<Detection>, Self::Error>;
}

/// Highest-confidence detection in a burst; the first one wins ties.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best: Option<&Detection>, d| match best {
        Some(b) if b.quality() >= d.quality() => Some(b),
        _ => Some(d),
    })
}
