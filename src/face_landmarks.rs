//! Model-backed facial landmarks: SCRFD face boxes followed by a 68-point mark
//! detector, reduced to the canonical pose landmarks.

use crate::{
    constants::{DEFAULT_FACE_IOU_THRESHOLD, FACE_BOX_SHIFT, NUM_IBUG_LANDMARKS},
    detection::{non_max_suppression, BoundingBox, Detection, LandmarkDetector},
    frame::Frame,
    landmarks::{LandmarkPoint, LandmarkSet},
    letterbox::{letterbox, Letterbox, Placement},
    Error, Result,
};
use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Default SCRFD input size
const DEFAULT_FACE_INPUT_SIZE: u32 = 640;

/// Default landmark detector input size
const DEFAULT_LANDMARK_INPUT_SIZE: u32 = 128;

/// Label attached to face detections
const FACE_LABEL: &str = "face";

/// Output grouping of an SCRFD model
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScrfdLayout {
    /// Distance outputs start this many outputs after the score outputs
    offset: usize,
    strides: Vec<u32>,
    num_anchors: usize,
}

impl ScrfdLayout {
    /// Derive the layout from the number of model outputs
    fn from_output_count(num_outputs: usize) -> Self {
        match num_outputs {
            6 | 9 => Self {
                offset: 3,
                strides: vec![8, 16, 32],
                num_anchors: 2,
            },
            10 | 15 => Self {
                offset: 5,
                strides: vec![8, 16, 32, 64, 128],
                num_anchors: 1,
            },
            _ => {
                log::warn!("Unknown face model configuration with {num_outputs} outputs, using defaults");
                Self::from_output_count(6)
            }
        }
    }
}

/// SCRFD face detector using `ONNX` Runtime
pub struct FaceDetector {
    session: Session,
    input_size: u32,
    layout: ScrfdLayout,
    conf_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    /// Create a new face detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P, conf_threshold: f32, nms_threshold: f32) -> Result<Self> {
        log::info!(
            "Initializing FaceDetector with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input_size = session
            .inputs
            .first()
            .ok_or_else(|| Error::Detector("Face model has no inputs".to_string()))?
            .dimensions
            .get(2)
            .copied()
            .flatten()
            .and_then(|d| u32::try_from(d).ok())
            .filter(|&d| d > 0)
            .unwrap_or(DEFAULT_FACE_INPUT_SIZE);
        let layout = ScrfdLayout::from_output_count(session.outputs.len());

        Ok(Self {
            session,
            input_size,
            layout,
            conf_threshold,
            nms_threshold,
        })
    }

    /// Detect faces, most confident first
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the outputs do not match the layout.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let size = self.input_size;
        let (canvas, mapping) = letterbox(frame.as_rgb(), size, size, Placement::TopLeft, [0, 0, 0]);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for ch in 0..3 {
                input[[0, ch, y as usize, x as usize]] = (f32::from(pixel[ch]) - 127.5) / 128.0;
            }
        }

        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut candidates = Vec::new();
        for (idx, &stride) in self.layout.strides.iter().enumerate() {
            let (Some(scores), Some(distances)) = (outputs.get(idx), outputs.get(idx + self.layout.offset)) else {
                return Err(Error::Detector(format!("Face model is missing outputs for stride {stride}")));
            };
            let scores: Vec<f32> = scores.try_extract::<f32>()?.view().iter().copied().collect();
            let distances: Vec<f32> = distances.try_extract::<f32>()?.view().iter().copied().collect();

            let decoded = decode_stride(
                &scores,
                &distances,
                stride,
                size / stride,
                self.layout.num_anchors,
                self.conf_threshold,
            )?;
            candidates.extend(decoded.into_iter().map(|(bbox, score)| Detection {
                label: FACE_LABEL.to_string(),
                confidence: score,
                bbox: Some(unmap(&bbox, &mapping)),
            }));
        }

        Ok(non_max_suppression(candidates, self.nms_threshold))
    }
}

fn unmap(bbox: &BoundingBox, mapping: &Letterbox) -> BoundingBox {
    let (x1, y1) = mapping.to_frame(bbox.x1, bbox.y1);
    let (x2, y2) = mapping.to_frame(bbox.x2, bbox.y2);
    BoundingBox::new(x1, y1, x2, y2)
}

/// Decode one SCRFD stride into boxes in model input pixels.
///
/// Anchors are laid out row by row over a grid `grid_width` cells wide with
/// `num_anchors` anchors per cell; distances are in stride units.
#[allow(clippy::cast_precision_loss)]
fn decode_stride(
    scores: &[f32],
    distances: &[f32],
    stride: u32,
    grid_width: u32,
    num_anchors: usize,
    threshold: f32,
) -> Result<Vec<(BoundingBox, f32)>> {
    if distances.len() != scores.len() * 4 {
        return Err(Error::Detector(format!(
            "Stride {stride} has {} scores but {} box distances",
            scores.len(),
            distances.len()
        )));
    }

    let grid_width = grid_width.max(1) as usize;
    let step = stride as f32;
    let boxes = scores
        .iter()
        .zip(distances.chunks_exact(4))
        .enumerate()
        .filter(|(_, (score, _))| **score >= threshold)
        .map(|(i, (&score, d))| {
            let cell = i / num_anchors.max(1);
            let cx = (cell % grid_width) as f32 * step;
            let cy = (cell / grid_width) as f32 * step;
            let bbox = BoundingBox::new(
                cx - d[0] * step,
                cy - d[1] * step,
                cx + d[2] * step,
                cy + d[3] * step,
            );
            (bbox, score)
        })
        .collect();
    Ok(boxes)
}

/// 68-point facial mark detector using `ONNX` Runtime
pub struct MarkDetector {
    session: Session,
    input_size: u32,
}

impl MarkDetector {
    /// Create a new landmark detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!(
            "Initializing MarkDetector with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("mark_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            input_size: DEFAULT_LANDMARK_INPUT_SIZE,
        })
    }

    /// Detect the 68 marks of a face crop, in crop pixels
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the output is too short.
    pub fn detect(&self, face: &RgbImage) -> Result<Vec<LandmarkPoint>> {
        let size = self.input_size;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);

        // The model takes NHWC input
        let mut input = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for ch in 0..3 {
                input[[0, y as usize, x as usize, ch]] = f32::from(pixel[ch]) / 255.0;
            }
        }

        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| Error::Detector("No output from mark model".to_string()))?;

        let values: Vec<f32> = output.try_extract::<f32>()?.view().iter().copied().collect();
        marks_to_points(&values, face.width(), face.height(), size)
    }
}

/// Scale marks from model input pixels to a `crop_width`x`crop_height` crop
fn marks_to_points(values: &[f32], crop_width: u32, crop_height: u32, input_size: u32) -> Result<Vec<LandmarkPoint>> {
    if values.len() < NUM_IBUG_LANDMARKS * 2 {
        return Err(Error::Detector(format!(
            "Mark model produced {} values, expected {}",
            values.len(),
            NUM_IBUG_LANDMARKS * 2
        )));
    }

    let sx = f64::from(crop_width) / f64::from(input_size);
    let sy = f64::from(crop_height) / f64::from(input_size);
    Ok(values
        .chunks_exact(2)
        .take(NUM_IBUG_LANDMARKS)
        .map(|xy| LandmarkPoint::new(f64::from(xy[0]) * sx, f64::from(xy[1]) * sy))
        .collect())
}

/// Integer crop `(x, y, width, height)` covering `bbox` inside the image, or
/// `None` when nothing of it is left
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn crop_region(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
    let x1 = (bbox.x1.max(0.0).floor() as u32).min(image_width);
    let y1 = (bbox.y1.max(0.0).floor() as u32).min(image_height);
    let x2 = (bbox.x2.max(0.0).ceil() as u32).min(image_width);
    let y2 = (bbox.y2.max(0.0).ceil() as u32).min(image_height);
    (x2 > x1 && y2 > y1).then(|| (x1, y1, x2 - x1, y2 - y1))
}

/// Landmark detector chaining face detection and mark detection
pub struct OnnxLandmarkDetector {
    faces: FaceDetector,
    marks: MarkDetector,
    max_faces: usize,
}

impl OnnxLandmarkDetector {
    /// Load both models
    ///
    /// # Errors
    ///
    /// Returns an error if either model cannot be loaded.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        face_model: P,
        landmark_model: Q,
        conf_threshold: f32,
        max_faces: usize,
    ) -> Result<Self> {
        Ok(Self {
            faces: FaceDetector::new(face_model, conf_threshold, DEFAULT_FACE_IOU_THRESHOLD)?,
            marks: MarkDetector::new(landmark_model)?,
            max_faces: max_faces.max(1),
        })
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    #[allow(clippy::cast_precision_loss)]
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        let faces = self.faces.detect(frame)?;
        log::debug!("Face detector kept {} face(s)", faces.len());

        let (width, height) = (frame.width(), frame.height());
        let mut sets = Vec::new();
        for bbox in faces.iter().take(self.max_faces).filter_map(|face| face.bbox) {
            let refined = bbox.refine_square(FACE_BOX_SHIFT, width as f32, height as f32);
            let Some((x, y, w, h)) = crop_region(&refined, width, height) else {
                continue;
            };

            let crop = imageops::crop_imm(frame.as_rgb(), x, y, w, h).to_image();
            let marks: Vec<LandmarkPoint> = self
                .marks
                .detect(&crop)?
                .into_iter()
                .map(|p| LandmarkPoint::new(p.x + f64::from(x), p.y + f64::from(y)))
                .collect();
            sets.push(LandmarkSet::from_ibug_marks(&marks)?);
        }
        Ok(sets)
    }
}
