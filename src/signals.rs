//! Detector outputs recorded by an upstream inference step.
//!
//! Lets the analysis run against detections and landmarks produced
//! elsewhere, e.g. replayed from a JSON document next to the image.

use crate::{
    detection::{DetectionSet, LandmarkDetector, ObjectDetector},
    frame::Frame,
    landmarks::LandmarkSet,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Recorded object detections and face landmarks for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedSignals {
    /// Object detections in detector order
    pub detections: DetectionSet,
    /// One landmark set per detected face
    pub faces: Vec<LandmarkSet>,
}

impl RecordedSignals {
    /// Parse signals from JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe recorded signals.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Serialization(format!("Failed to parse signals: {e}")))
    }

    /// Load signals from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading recorded signals from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl ObjectDetector for RecordedSignals {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet> {
        Ok(self.detections.clone())
    }
}

impl LandmarkDetector for RecordedSignals {
    fn detect_faces(&self, _frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Ok(self.faces.clone())
    }
}
