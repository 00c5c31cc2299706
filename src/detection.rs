//! Object detections and the detector collaborator seams.

use crate::{frame::Frame, landmarks::LandmarkSet, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
    /// Right edge
    pub x2: f32,
    /// Bottom edge
    pub y2: f32,
}

impl BoundingBox {
    /// Create a box from its corner coordinates
    #[must_use]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box area, zero for degenerate boxes
    #[must_use]
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Grow the box by `shift` of its size on each side and make it square,
    /// keeping it inside a `width`x`height` image
    #[must_use]
    pub fn refine_square(&self, shift: f32, width: f32, height: f32) -> Self {
        let x_shift = (self.x2 - self.x1) * shift;
        let y_shift = (self.y2 - self.y1) * shift;

        let x1 = (self.x1 - x_shift).max(0.0);
        let y1 = (self.y1 - y_shift).max(0.0);
        let x2 = (self.x2 + x_shift).min(width);
        let y2 = (self.y2 + y_shift).min(height);

        let side = (x2 - x1).max(y2 - y1).min(width).min(height);
        let x1 = x1.min(width - side).max(0.0);
        let y1 = y1.min(height - side).max(0.0);
        Self::new(x1, y1, x1 + side, y1 + side)
    }
}

/// A single labelled object found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Label from the detector's vocabulary, e.g. "person" or "cell phone"
    pub label: String,
    /// Detection confidence in `[0, 1]`
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Location of the object, when the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    /// Detection with a label and confidence but no location
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }
}

/// Ordered detections produced for one frame. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    /// Empty detection set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set of full-confidence detections from bare labels
    #[must_use]
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        labels.into_iter().map(|label| Detection::new(label, 1.0)).collect()
    }

    /// Append a detection
    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    /// Iterate over the detections in detector order
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    /// Iterate over the labels in detector order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.detections.iter().map(|d| d.label.as_str())
    }

    /// Number of detections
    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether nothing was detected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        Self {
            detections: iter.into_iter().collect(),
        }
    }
}

/// Object detector collaborator.
///
/// An empty set is a valid result; an `Err` means the detector itself failed.
pub trait ObjectDetector: Send + Sync {
    /// Detect labelled objects in a frame
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect(&self, frame: &Frame) -> Result<DetectionSet>;
}

/// Facial landmark detector collaborator.
///
/// Returns one landmark set per detected face; zero or several are valid.
pub trait LandmarkDetector: Send + Sync {
    /// Detect faces and their canonical landmarks in a frame
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<LandmarkSet>>;
}

/// Landmark detector that never finds a face
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLandmarks;

impl LandmarkDetector for NoLandmarks {
    fn detect_faces(&self, _frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Ok(Vec::new())
    }
}

/// Greedy per-label non-maximum suppression.
///
/// Detections without a bounding box are always kept. The result is ordered
/// by descending confidence.
#[must_use]
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = candidate.bbox.is_some_and(|bbox| {
            keep.iter().any(|kept| {
                kept.label == candidate.label && kept.bbox.is_some_and(|other| bbox.iou(&other) > iou_threshold)
            })
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(label: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox: Some(bbox),
        }
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_refine_square() {
        let refined = BoundingBox::new(10.0, 10.0, 60.0, 60.0).refine_square(0.1, 200.0, 200.0);
        assert_eq!(refined, BoundingBox::new(5.0, 5.0, 65.0, 65.0));

        let tall = BoundingBox::new(100.0, 100.0, 130.0, 140.0).refine_square(0.0, 200.0, 200.0);
        assert_eq!(tall.x2 - tall.x1, 40.0);
        assert_eq!(tall.y2 - tall.y1, 40.0);
    }

    #[test]
    fn test_refine_square_stays_inside_image() {
        for bbox in [
            BoundingBox::new(190.0, 190.0, 210.0, 210.0),
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(-20.0, 50.0, 180.0, 250.0),
        ] {
            let refined = bbox.refine_square(0.5, 200.0, 150.0);
            assert!(refined.x1 >= 0.0 && refined.y1 >= 0.0, "{refined:?}");
            assert!(refined.x2 <= 200.0 && refined.y2 <= 150.0, "{refined:?}");
            assert!((refined.x2 - refined.x1 - (refined.y2 - refined.y1)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_label() {
        let detections = vec![
            boxed("person", 0.6, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            boxed("person", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            boxed("person", 0.8, BoundingBox::new(100.0, 100.0, 110.0, 110.0)),
        ];

        let kept = non_max_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_labels() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let detections = vec![boxed("person", 0.9, bbox), boxed("cell phone", 0.5, bbox)];
        assert_eq!(non_max_suppression(detections, 0.45).len(), 2);
    }

    #[test]
    fn test_detection_set_from_labels() {
        let set = DetectionSet::from_labels(["person", "cell phone"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.labels().collect::<Vec<_>>(), vec!["person", "cell phone"]);
        assert!(DetectionSet::new().is_empty());
    }

    #[test]
    fn test_detection_set_json_defaults() {
        let set: DetectionSet = serde_json::from_str(r#"[{"label": "person"}]"#).unwrap();
        assert_eq!(set.len(), 1);
        let first = set.iter().next().unwrap();
        assert_eq!(first.confidence, 1.0);
        assert!(first.bbox.is_none());
    }
}
