//! Helper functions and utilities for tests
#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use nalgebra::{Rotation3, Vector3};
use proctor_vision::{
    detection::{DetectionSet, LandmarkDetector, ObjectDetector},
    frame::Frame,
    landmarks::LandmarkSet,
    pose_estimation::{CameraIntrinsics, HeadPoseEstimator},
    signals::RecordedSignals,
    Error, Result,
};
use std::io::Cursor;

/// Frame width used by the scenario images
pub const WIDTH: u32 = 640;

/// Frame height used by the scenario images
pub const HEIGHT: u32 = 480;

/// Encode an RGB image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("PNG encoding failed");
    bytes
}

/// Well-lit, textured image that never looks occluded
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let v = ((x * 255) / width.max(1)) as u8;
        Rgb([v, v, v])
    })
}

/// Alternating columns of two gray levels
pub fn striped_image(width: u32, height: u32, low: u8, high: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let v = if x % 2 == 0 { low } else { high };
        Rgb([v, v, v])
    })
}

/// Landmarks of a face 600mm from the camera with the given pitch and yaw
pub fn synthetic_face(pitch_deg: f64, yaw_deg: f64, width: u32, height: u32) -> LandmarkSet {
    let estimator = HeadPoseEstimator::new();
    let camera = CameraIntrinsics::from_image_size(width, height);
    let rotation = Rotation3::from_euler_angles(pitch_deg.to_radians(), yaw_deg.to_radians(), 0.0);
    let translation = Vector3::new(0.0, 0.0, 600.0);

    let points = estimator
        .model_points()
        .map(|p| camera.project(&(rotation * p + translation)).expect("point behind camera"));
    LandmarkSet::from_points(points)
}

/// Collaborator replaying fixed detections and faces
pub fn recorded(labels: &[&str], faces: Vec<LandmarkSet>) -> RecordedSignals {
    RecordedSignals {
        detections: DetectionSet::from_labels(labels.iter().copied()),
        faces,
    }
}

/// Detector collaborator that always fails
pub struct FailingDetector;

impl ObjectDetector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet> {
        Err(Error::InvalidInput("model session closed".to_string()))
    }
}

impl LandmarkDetector for FailingDetector {
    fn detect_faces(&self, _frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Err(Error::InvalidInput("model session closed".to_string()))
    }
}
