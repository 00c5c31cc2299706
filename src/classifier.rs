//! Learned violation classifier and its fusion with rule-based events.

use crate::{
    constants::NO_VIOLATION_LABEL,
    events::{EventType, Severity, ViolationEvent},
    features::{FeatureRecord, FEATURE_COUNT},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::RandomForestClassifier;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::path::Path;
use std::sync::Arc;

/// Random forest over the feature vector, predicting label indices
pub type Forest = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Multi-class classifier over the frame feature vector
pub trait Classifier: Send + Sync {
    /// Predict the raw label for one feature vector
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot produce a prediction.
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<String>;
}

/// Map a classifier label to an event type.
///
/// Accepts the deployed model's vocabulary and English aliases; anything
/// unrecognized becomes [`EventType::SuspiciousBehavior`].
#[must_use]
pub fn map_label(label: &str) -> EventType {
    match label {
        "Roi_manhinh" | "face_not_detected" => EventType::FaceNotDetected,
        "Nhieu_nguoi" | "multiple_faces" => EventType::MultipleFaces,
        "Dien_thoai" | "mobile_phone" => EventType::MobilePhoneDetected,
        "Che_camera" | "camera_tampered" => EventType::CameraTampered,
        "looking_away" => EventType::LookingAway,
        _ => EventType::SuspiciousBehavior,
    }
}

/// Serialized form of [`ForestClassifier`]
#[derive(Serialize, Deserialize)]
struct ForestArtifact {
    labels: Vec<String>,
    forest: Forest,
}

/// Random forest classifier with its label vocabulary, loaded from a bincode blob
pub struct ForestClassifier {
    labels: Vec<String>,
    forest: Forest,
}

impl ForestClassifier {
    /// Wrap a trained forest whose class `i` means `labels[i]`
    ///
    /// # Errors
    ///
    /// Returns an error if the label vocabulary is empty.
    pub fn from_parts(labels: Vec<String>, forest: Forest) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Classifier("Label vocabulary is empty".to_string()));
        }
        Ok(Self { labels, forest })
    }

    /// Load a classifier artifact from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading violation classifier from: {}", path.as_ref().display());
        let bytes = std::fs::read(path)?;
        let artifact: ForestArtifact = bincode::deserialize(&bytes)
            .map_err(|e| Error::Classifier(format!("Failed to decode classifier artifact: {e}")))?;
        Self::from_parts(artifact.labels, artifact.forest)
    }

    /// Save the classifier artifact to disk
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let artifact = ForestArtifact {
            labels: self.labels,
            forest: self.forest,
        };
        let bytes = bincode::serialize(&artifact)
            .map_err(|e| Error::Serialization(format!("Failed to encode classifier artifact: {e}")))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Label vocabulary in class index order
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Classifier for ForestClassifier {
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<String> {
        let input = DenseMatrix::from_2d_array(&[&features[..]]);
        let prediction = self
            .forest
            .predict(&input)
            .map_err(|e| Error::Classifier(format!("Prediction failed: {e}")))?;
        let class = *prediction
            .first()
            .ok_or_else(|| Error::Classifier("Classifier returned no prediction".to_string()))?;

        usize::try_from(class)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .cloned()
            .ok_or_else(|| Error::Classifier(format!("Predicted class {class} has no label")))
    }
}

/// Load the optional classifier, degrading to `None` on any failure
#[must_use]
pub fn load_classifier(path: Option<&Path>) -> Option<Arc<dyn Classifier>> {
    let path = path?;
    match ForestClassifier::load(path) {
        Ok(classifier) => {
            log::info!("Classifier loaded with {} labels", classifier.labels().len());
            Some(Arc::new(classifier))
        }
        Err(e) => {
            log::warn!("Classifier unavailable ({e}); classifier fusion disabled");
            None
        }
    }
}

/// Adds a classifier-predicted event when the rules missed that violation
#[derive(Clone, Default)]
pub struct ClassifierFusion {
    classifier: Option<Arc<dyn Classifier>>,
}

impl ClassifierFusion {
    /// Fusion with an optional classifier; `None` disables the step
    #[must_use]
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    /// Whether a classifier is available
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    /// Predict a gap-filling event.
    ///
    /// Emits nothing when no classifier is loaded, the prediction is the
    /// no-violation sentinel, the mapped type is already present or the
    /// classifier fails.
    #[must_use]
    pub fn predict(&self, features: &FeatureRecord, existing_events: &[ViolationEvent]) -> Option<ViolationEvent> {
        let classifier = self.classifier.as_ref()?;

        let label = match classifier.predict(&features.to_vector()) {
            Ok(label) => label,
            Err(e) => {
                log::warn!("Classifier prediction skipped: {e}");
                return None;
            }
        };

        if label == NO_VIOLATION_LABEL {
            return None;
        }

        let event_type = map_label(&label);
        if existing_events.iter().any(|e| e.event_type() == event_type) {
            log::debug!("Classifier predicted {label}, already covered by rules");
            return None;
        }

        log::debug!("Classifier adds {event_type} from label {label}");
        Some(
            ViolationEvent::new(event_type, Severity::Medium)
                .with_metadata("source", "ml_model")
                .with_metadata("prediction", label),
        )
    }
}

impl std::fmt::Debug for ClassifierFusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierFusion")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLabel(&'static str);

    impl Classifier for FixedLabel {
        fn predict(&self, _features: &[f64; FEATURE_COUNT]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn predict(&self, _features: &[f64; FEATURE_COUNT]) -> Result<String> {
            Err(Error::Classifier("corrupt model".to_string()))
        }
    }

    fn features() -> FeatureRecord {
        FeatureRecord {
            person_count: 1,
            phone_flag: 0,
            mean_brightness: 120.0,
            brightness_stddev: 40.0,
            pitch: 0.0,
            yaw: 0.0,
            motion_ratio: 0.0,
            occlusion_flag: 0,
        }
    }

    fn fusion(label: &'static str) -> ClassifierFusion {
        ClassifierFusion::new(Some(Arc::new(FixedLabel(label))))
    }

    #[test]
    fn test_label_table() {
        assert_eq!(map_label("Roi_manhinh"), EventType::FaceNotDetected);
        assert_eq!(map_label("Nhieu_nguoi"), EventType::MultipleFaces);
        assert_eq!(map_label("Dien_thoai"), EventType::MobilePhoneDetected);
        assert_eq!(map_label("Che_camera"), EventType::CameraTampered);
        assert_eq!(map_label("looking_away"), EventType::LookingAway);
        assert_eq!(map_label("Khac"), EventType::SuspiciousBehavior);
        assert_eq!(map_label("something_new"), EventType::SuspiciousBehavior);
    }

    #[test]
    fn test_disabled_fusion_is_noop() {
        let fusion = ClassifierFusion::default();
        assert!(!fusion.is_enabled());
        assert!(fusion.predict(&features(), &[]).is_none());
    }

    #[test]
    fn test_no_violation_sentinel() {
        assert!(fusion(NO_VIOLATION_LABEL).predict(&features(), &[]).is_none());
    }

    #[test]
    fn test_emits_medium_event_with_audit_metadata() {
        let event = fusion("Dien_thoai").predict(&features(), &[]).unwrap();
        assert_eq!(event.event_type(), EventType::MobilePhoneDetected);
        assert_eq!(event.severity(), Severity::Medium);
        assert_eq!(event.metadata()["source"], "ml_model");
        assert_eq!(event.metadata()["prediction"], "Dien_thoai");
    }

    #[test]
    fn test_rules_take_precedence() {
        let existing = vec![ViolationEvent::new(EventType::CameraTampered, Severity::Medium)];
        assert!(fusion("Che_camera").predict(&features(), &existing).is_none());
        assert!(fusion("Khac").predict(&features(), &existing).is_some());
    }

    #[test]
    fn test_classifier_failure_is_absorbed() {
        let fusion = ClassifierFusion::new(Some(Arc::new(Broken)));
        assert!(fusion.predict(&features(), &[]).is_none());
    }

    #[test]
    fn test_load_missing_artifact_degrades() {
        assert!(load_classifier(None).is_none());
        assert!(load_classifier(Some(Path::new("/nonexistent/violation_model.bin"))).is_none());
    }
}
