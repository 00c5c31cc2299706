//! Single-frame analysis for remote exam proctoring.
//!
//! This library turns one still image from a candidate's camera into a list
//! of violation events (no face, several people, phone, covered camera,
//! looking away), fusing:
//! - An object detector (any [`detection::ObjectDetector`], e.g. YOLOv8 via
//!   ONNX Runtime with the `onnx` feature)
//! - A facial landmark detector feeding a `PnP` head pose estimate
//! - Pixel intensity statistics for camera occlusion
//! - An optional pretrained classifier that fills gaps left by the rules
//!
//! The analysis pipeline consists of:
//! 1. Decoding the uploaded image
//! 2. Running the object and landmark detectors
//! 3. Head pose estimation when exactly one face is visible
//! 4. Feature extraction into a fixed [`features::FeatureRecord`]
//! 5. Threshold rules, then classifier fusion
//! 6. Deduplication into at most one event per type
//!
//! # Examples
//!
//! ```no_run
//! use proctor_vision::{
//!     analyzer::Analyzer,
//!     classifier::load_classifier,
//!     detection::NoLandmarks,
//!     signals::RecordedSignals,
//! };
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signals = RecordedSignals::from_file("frame.signals.json")?;
//! let analyzer = Analyzer::new(Box::new(signals), Box::new(NoLandmarks))
//!     .with_classifier(load_classifier(Some(Path::new("assets/violation_model.bin"))));
//!
//! let bytes = std::fs::read("frame.jpg")?;
//! for event in analyzer.analyze(&bytes)? {
//!     println!("{} ({:?})", event.event_type(), event.severity());
//! }
//! # Ok(())
//! # }
//! ```

/// Single-frame analysis entry point
pub mod analyzer;

/// Optional learned classifier and its fusion with rule events
pub mod classifier;

/// Configuration management
pub mod config;

/// Constants used throughout the analysis
pub mod constants;

/// Detections and detector collaborator traits
pub mod detection;

/// Error types and result handling
pub mod error;

/// Face detection and 68-point marks on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod face_landmarks;

/// Violation events and final list assembly
pub mod events;

/// Feature extraction from frame signals
pub mod features;

/// Decoded frames and intensity statistics
pub mod frame;

/// Canonical facial landmarks
pub mod landmarks;

/// Aspect-preserving resize for model inputs
pub mod letterbox;

/// Head pose estimation module using `PnP` algorithm
pub mod pose_estimation;

/// Threshold rules
pub mod rules;

/// Recorded detector outputs
pub mod signals;

/// YOLOv8 object detector on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod yolo;

pub use error::{Error, Result};
