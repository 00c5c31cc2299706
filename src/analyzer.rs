//! Single-frame analysis: detectors, head pose, features, rules and fusion.

use crate::{
    classifier::{Classifier, ClassifierFusion},
    config::Config,
    detection::{LandmarkDetector, ObjectDetector},
    events::{assemble, ViolationEvent},
    features::{FeatureExtractor, FeatureRecord},
    frame::Frame,
    pose_estimation::{HeadAngles, HeadPoseEstimator},
    rules::RuleEngine,
    Error, Result,
};
use std::sync::Arc;

/// Everything derived from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    /// Feature record fed to rules and classifier
    pub features: FeatureRecord,
    /// Head angles, present only for exactly one face with a converged solve
    pub head_angles: Option<HeadAngles>,
    /// Deduplicated violation events
    pub events: Vec<ViolationEvent>,
}

/// Analysis context holding the read-only collaborators shared by all requests
pub struct Analyzer {
    object_detector: Box<dyn ObjectDetector>,
    landmark_detector: Box<dyn LandmarkDetector>,
    pose_estimator: HeadPoseEstimator,
    feature_extractor: FeatureExtractor,
    rule_engine: RuleEngine,
    fusion: ClassifierFusion,
}

impl Analyzer {
    /// Create an analyzer with default thresholds and no classifier
    #[must_use]
    pub fn new(object_detector: Box<dyn ObjectDetector>, landmark_detector: Box<dyn LandmarkDetector>) -> Self {
        Self {
            object_detector,
            landmark_detector,
            pose_estimator: HeadPoseEstimator::new(),
            feature_extractor: FeatureExtractor::default(),
            rule_engine: RuleEngine::default(),
            fusion: ClassifierFusion::default(),
        }
    }

    /// Create an analyzer using the thresholds and label vocabulary of `config`
    #[must_use]
    pub fn from_config(
        config: &Config,
        object_detector: Box<dyn ObjectDetector>,
        landmark_detector: Box<dyn LandmarkDetector>,
    ) -> Self {
        Self {
            feature_extractor: config.feature_extractor(),
            rule_engine: config.rule_engine(),
            ..Self::new(object_detector, landmark_detector)
        }
    }

    /// Attach the optional classifier; `None` keeps fusion disabled
    #[must_use]
    pub fn with_classifier(mut self, classifier: Option<Arc<dyn Classifier>>) -> Self {
        self.fusion = ClassifierFusion::new(classifier);
        self
    }

    /// Whether classifier fusion is active
    #[must_use]
    pub fn classifier_enabled(&self) -> bool {
        self.fusion.is_enabled()
    }

    /// Decode an uploaded image and return its violation events
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` for undecodable bytes and `Error::Detector`
    /// when a detector collaborator fails.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<Vec<ViolationEvent>> {
        let frame = Frame::decode(image_bytes)?;
        Ok(self.analyze_frame(&frame)?.events)
    }

    /// Analyze an already decoded frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Detector` when a detector collaborator fails.
    pub fn analyze_frame(&self, frame: &Frame) -> Result<FrameAnalysis> {
        let detections = self
            .object_detector
            .detect(frame)
            .map_err(|e| Error::Detector(format!("object detector failed: {e}")))?;
        let faces = self
            .landmark_detector
            .detect_faces(frame)
            .map_err(|e| Error::Detector(format!("landmark detector failed: {e}")))?;

        log::debug!(
            "Frame {}x{}: {} detection(s), {} face(s)",
            frame.width(),
            frame.height(),
            detections.len(),
            faces.len()
        );

        let head_angles = match faces.as_slice() {
            [face] => self.pose_estimator.estimate(face, frame.height(), frame.width()),
            _ => None,
        };

        // No per-session frame history is kept, so motion is never measured here
        let features = self
            .feature_extractor
            .extract(frame, None, head_angles, &detections);

        let rule_events = self.rule_engine.evaluate(&features, head_angles);
        let fused = self.fusion.predict(&features, &rule_events);
        let events = assemble(rule_events, fused);

        Ok(FrameAnalysis {
            features,
            head_angles,
            events,
        })
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("rule_engine", &self.rule_engine)
            .field("feature_extractor", &self.feature_extractor)
            .field("fusion", &self.fusion)
            .finish_non_exhaustive()
    }
}
