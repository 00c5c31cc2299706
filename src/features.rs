//! Per-frame feature extraction.
//!
//! Turns raw frame signals (intensity statistics, detector labels, head pose
//! and an optional previous frame) into the fixed-shape [`FeatureRecord`]
//! consumed by the rule engine and the classifier.

use crate::{
    constants::{DARK_THRESHOLD, PERSON_LABEL, PHONE_LABEL_MARKERS, UNIFORM_THRESHOLD},
    detection::DetectionSet,
    frame::{changed_pixel_ratio, Frame, IntensityStats},
    pose_estimation::HeadAngles,
};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Number of values in the classifier feature vector
pub const FEATURE_COUNT: usize = 8;

/// Numeric features of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Detections labelled as a person
    pub person_count: u32,
    /// 1 if a phone was detected
    pub phone_flag: u8,
    /// Mean grayscale intensity
    pub mean_brightness: f64,
    /// Population standard deviation of grayscale intensity
    pub brightness_stddev: f64,
    /// Head pitch in degrees, 0.0 when unavailable
    pub pitch: f64,
    /// Head yaw in degrees, 0.0 when unavailable
    pub yaw: f64,
    /// Fraction of pixels changed since the previous frame
    pub motion_ratio: f64,
    /// 1 if the view looks covered (too dark or too uniform)
    pub occlusion_flag: u8,
}

impl FeatureRecord {
    /// Classifier input in its training order: person count, phone flag,
    /// mean brightness, brightness stddev, pitch, yaw, motion ratio, occlusion flag
    #[must_use]
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.person_count),
            f64::from(self.phone_flag),
            self.mean_brightness,
            self.brightness_stddev,
            self.pitch,
            self.yaw,
            self.motion_ratio,
            f64::from(self.occlusion_flag),
        ]
    }
}

/// Feature extractor with configurable label vocabulary and occlusion thresholds
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    person_label: String,
    dark_threshold: f64,
    uniform_threshold: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(PERSON_LABEL, DARK_THRESHOLD, UNIFORM_THRESHOLD)
    }
}

impl FeatureExtractor {
    /// Create an extractor
    #[must_use]
    pub fn new(person_label: impl Into<String>, dark_threshold: f64, uniform_threshold: f64) -> Self {
        Self {
            person_label: person_label.into(),
            dark_threshold,
            uniform_threshold,
        }
    }

    /// Extract the feature record of a frame
    #[must_use]
    pub fn extract(
        &self,
        frame: &Frame,
        previous_grayscale: Option<&GrayImage>,
        head_angles: Option<HeadAngles>,
        detections: &DetectionSet,
    ) -> FeatureRecord {
        let gray = frame.to_grayscale();
        let stats = IntensityStats::of(&gray);

        let motion_ratio = previous_grayscale.map_or(0.0, |previous| {
            changed_pixel_ratio(&gray, previous).unwrap_or_else(|| {
                log::debug!(
                    "Previous frame is {:?}, current is {:?}; motion not computed",
                    previous.dimensions(),
                    gray.dimensions()
                );
                0.0
            })
        });

        let record = FeatureRecord {
            person_count: self.count_persons(detections),
            phone_flag: u8::from(has_phone(detections)),
            mean_brightness: stats.mean,
            brightness_stddev: stats.std_dev,
            pitch: head_angles.map_or(0.0, |a| a.pitch),
            yaw: head_angles.map_or(0.0, |a| a.yaw),
            motion_ratio,
            occlusion_flag: u8::from(self.is_occluded(&stats)),
        };
        log::debug!("Extracted features: {record:?}");
        record
    }

    /// Whether intensity statistics indicate a covered or pointed-away camera
    #[must_use]
    pub fn is_occluded(&self, stats: &IntensityStats) -> bool {
        stats.mean < self.dark_threshold || stats.std_dev < self.uniform_threshold
    }

    #[allow(clippy::cast_possible_truncation)] // Detection counts are tiny
    fn count_persons(&self, detections: &DetectionSet) -> u32 {
        detections.labels().filter(|label| *label == self.person_label).count() as u32
    }
}

/// Whether any label mentions a phone, case-insensitively
#[must_use]
pub fn has_phone(detections: &DetectionSet) -> bool {
    detections.labels().any(|label| {
        let label = label.to_lowercase();
        PHONE_LABEL_MARKERS.iter().any(|marker| label.contains(marker))
    })
}
