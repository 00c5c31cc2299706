//! Configuration management for the proctoring analyzer

use crate::{
    constants::{
        DARK_THRESHOLD, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FACE_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD,
        DEFAULT_MAX_FACES, PERSON_LABEL, PITCH_DOWN_THRESHOLD, UNIFORM_THRESHOLD, YAW_SIDE_THRESHOLD,
    },
    features::FeatureExtractor,
    rules::RuleEngine,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub models: ModelConfig,

    /// Object detection configuration
    pub detection: DetectionConfig,

    /// Rule thresholds
    pub thresholds: ThresholdConfig,
}

/// Model file paths configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the violation classifier artifact; fusion is disabled when unset
    pub classifier: Option<PathBuf>,

    /// Path to the YOLO object detector ONNX model
    pub object_detector: PathBuf,

    /// Path to the SCRFD face detector ONNX model
    pub face_detector: PathBuf,

    /// Path to the 68-point facial landmark ONNX model
    pub landmark_detector: PathBuf,
}

/// Object detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Confidence threshold for object detection (0.0-1.0)
    pub confidence_threshold: f32,

    /// IOU threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,

    /// Detector label counted as a person
    pub person_label: String,

    /// Confidence threshold for face detection (0.0-1.0)
    pub face_confidence_threshold: f32,

    /// Faces passed on to landmark detection per frame
    pub max_faces: usize,
}

/// Decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Pitch in degrees above which the candidate looks down
    pub pitch_down: f64,

    /// Absolute yaw in degrees above which the candidate looks aside
    pub yaw_side: f64,

    /// Mean intensity below which the camera counts as covered
    pub dark: f64,

    /// Intensity standard deviation below which the view counts as uniform
    pub uniform: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier: None,
            object_detector: PathBuf::from("assets/yolov8n.onnx"),
            face_detector: PathBuf::from("assets/face_detector.onnx"),
            landmark_detector: PathBuf::from("assets/face_landmarks.onnx"),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            person_label: PERSON_LABEL.to_string(),
            face_confidence_threshold: DEFAULT_FACE_CONFIDENCE_THRESHOLD,
            max_faces: DEFAULT_MAX_FACES,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            pitch_down: PITCH_DOWN_THRESHOLD,
            yaw_side: YAW_SIDE_THRESHOLD,
            dark: DARK_THRESHOLD,
            uniform: UNIFORM_THRESHOLD,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Rule engine using the configured gaze thresholds
    #[must_use]
    pub fn rule_engine(&self) -> RuleEngine {
        RuleEngine::new(self.thresholds.pitch_down, self.thresholds.yaw_side)
    }

    /// Feature extractor using the configured label and occlusion thresholds
    #[must_use]
    pub fn feature_extractor(&self) -> FeatureExtractor {
        FeatureExtractor::new(
            self.detection.person_label.clone(),
            self.thresholds.dark,
            self.thresholds.uniform,
        )
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(Error::ConfigError(
                "IOU threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.face_confidence_threshold) {
            return Err(Error::ConfigError(
                "Face confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.detection.max_faces == 0 {
            return Err(Error::ConfigError("At least one face must be allowed".to_string()));
        }
        if self.detection.person_label.trim().is_empty() {
            return Err(Error::ConfigError("Person label must not be empty".to_string()));
        }

        for (name, value) in [
            ("pitch_down", self.thresholds.pitch_down),
            ("yaw_side", self.thresholds.yaw_side),
            ("dark", self.thresholds.dark),
            ("uniform", self.thresholds.uniform),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!(
                    "Threshold {name} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Proctoring analyzer configuration

# Model paths
models:
  # classifier: "assets/violation_model.bin"
  object_detector: "assets/yolov8n.onnx"
  face_detector: "assets/face_detector.onnx"
  landmark_detector: "assets/face_landmarks.onnx"

# Object detection parameters
detection:
  confidence_threshold: 0.4
  iou_threshold: 0.45
  person_label: "person"
  # Pose is only estimated when exactly one face is found
  face_confidence_threshold: 0.5
  max_faces: 2

# Decision thresholds
thresholds:
  pitch_down: 20.0
  yaw_side: 25.0
  dark: 40.0
  uniform: 10.0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_matches_defaults() {
        let parsed = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed = Config::from_yaml("thresholds:\n  pitch_down: 15.0\n").unwrap();
        assert_eq!(parsed.thresholds.pitch_down, 15.0);
        assert_eq!(parsed.thresholds.yaw_side, YAW_SIDE_THRESHOLD);
        assert_eq!(parsed.detection.person_label, "person");
        assert!(parsed.models.classifier.is_none());
        assert_eq!(parsed.models.landmark_detector, PathBuf::from("assets/face_landmarks.onnx"));
        assert_eq!(parsed.detection.max_faces, 2);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.detection.confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let mut config = Config::default();
        config.thresholds.yaw_side = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.person_label = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.face_confidence_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.max_faces = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            Config::from_yaml("thresholds: [1, 2"),
            Err(Error::ConfigError(_))
        ));
    }
}
