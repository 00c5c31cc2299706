//! YOLOv8 object detector using `ONNX` Runtime.

use crate::{
    detection::{non_max_suppression, BoundingBox, Detection, DetectionSet, ObjectDetector},
    frame::Frame,
    letterbox::{letterbox, Letterbox, Placement},
    Error, Result,
};
use ndarray::{Array4, ArrayView3, CowArray, Ix3};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Default square model input size
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Canvas color around the letterboxed frame
const PAD_COLOR: [u8; 3] = [114, 114, 114];

/// Number of box coordinates preceding the class scores in each prediction
const BOX_VALUES: usize = 4;

/// COCO class names in model output order
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat", "traffic light",
    "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog", "horse", "sheep", "cow",
    "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard",
    "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// YOLOv8 detector producing labelled detections above a confidence threshold
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    /// Create a new detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P, conf_threshold: f32, iou_threshold: f32) -> Result<Self> {
        log::info!(
            "Initializing YoloDetector with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("object_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input_meta = session
            .inputs
            .first()
            .ok_or_else(|| Error::Detector("Model has no inputs".to_string()))?;

        // Shape is [batch, channels, height, width]; dynamic axes fall back to the default
        let input_size = input_meta
            .dimensions
            .get(2)
            .copied()
            .flatten()
            .and_then(|d| u32::try_from(d).ok())
            .filter(|&d| d > 0)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            input_size,
            conf_threshold,
            iou_threshold,
        })
    }

    /// Letterbox to the model input and convert to normalized NCHW RGB
    fn preprocess(&self, frame: &Frame) -> (Array4<f32>, Letterbox) {
        let size = self.input_size;
        let (canvas, mapping) = letterbox(frame.as_rgb(), size, size, Placement::Centered, PAD_COLOR);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for ch in 0..3 {
                input[[0, ch, y as usize, x as usize]] = f32::from(pixel[ch]) / 255.0;
            }
        }
        (input, mapping)
    }

    /// Run the model and decode its predictions into frame coordinates
    fn forward(&self, input: Array4<f32>, mapping: &Letterbox) -> Result<Vec<Detection>> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| Error::Detector("No output from model".to_string()))?;

        let tensor = output.try_extract::<f32>()?;
        let predictions = tensor
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::Detector(format!("Unexpected output shape: {e}")))?;

        decode_predictions(predictions, self.conf_threshold, mapping)
    }
}

/// Decode `[1, 4 + classes, anchors]` YOLOv8 predictions.
///
/// Each anchor keeps its best class when that score reaches `conf_threshold`;
/// boxes are converted from center/size to corners in frame pixels.
fn decode_predictions(predictions: ArrayView3<'_, f32>, conf_threshold: f32, mapping: &Letterbox) -> Result<Vec<Detection>> {
    let (_, values, anchors) = predictions.dim();
    if values <= BOX_VALUES {
        return Err(Error::Detector(format!("Output has only {values} values per anchor")));
    }

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let best = (BOX_VALUES..values)
            .map(|row| (row - BOX_VALUES, predictions[[0, row, anchor]]))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let Some((class, score)) = best else { continue };
        if score < conf_threshold {
            continue;
        }

        let cx = predictions[[0, 0, anchor]];
        let cy = predictions[[0, 1, anchor]];
        let w = predictions[[0, 2, anchor]];
        let h = predictions[[0, 3, anchor]];
        let (x1, y1) = mapping.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = mapping.to_frame(cx + w / 2.0, cy + h / 2.0);

        let label = COCO_CLASSES
            .get(class)
            .map_or_else(|| format!("class_{class}"), |name| (*name).to_string());
        detections.push(Detection {
            label,
            confidence: score,
            bbox: Some(BoundingBox::new(x1, y1, x2, y2)),
        });
    }

    Ok(detections)
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet> {
        let (input, mapping) = self.preprocess(frame);
        let candidates = self.forward(input, &mapping)?;
        let kept = non_max_suppression(candidates, self.iou_threshold);
        log::debug!("YOLO kept {} detection(s)", kept.len());
        Ok(kept.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn predictions(anchors: &[([f32; 4], usize, f32)]) -> Array3<f32> {
        let mut array = Array3::<f32>::zeros((1, BOX_VALUES + COCO_CLASSES.len(), anchors.len()));
        for (anchor, (bbox, class, score)) in anchors.iter().enumerate() {
            for (row, value) in bbox.iter().enumerate() {
                array[[0, row, anchor]] = *value;
            }
            array[[0, BOX_VALUES + class, anchor]] = *score;
        }
        array
    }

    #[test]
    fn test_coco_vocabulary() {
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[67], "cell phone");
    }

    #[test]
    fn test_decode_maps_classes_and_drops_weak_anchors() {
        let array = predictions(&[
            ([320.0, 320.0, 100.0, 50.0], 0, 0.9),
            ([100.0, 200.0, 20.0, 40.0], 67, 0.6),
            ([50.0, 50.0, 10.0, 10.0], 2, 0.2),
        ]);
        let mapping = Letterbox::fit(640, 640, 640, 640, Placement::Centered);

        let detections = decode_predictions(array.view(), 0.4, &mapping).unwrap();
        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "cell phone"]);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[1].bbox, Some(BoundingBox::new(90.0, 180.0, 110.0, 220.0)));
    }

    #[test]
    fn test_decode_undoes_letterbox_for_wide_frames() {
        let array = predictions(&[([320.0, 320.0, 100.0, 50.0], 0, 0.9)]);
        // 1280x720 is scaled by 0.5 and padded by 140 rows on each side
        let mapping = Letterbox::fit(1280, 720, 640, 640, Placement::Centered);

        let detections = decode_predictions(array.view(), 0.4, &mapping).unwrap();
        let bbox = detections[0].bbox.unwrap();
        assert!((bbox.x1 - 540.0).abs() < 1e-3);
        assert!((bbox.y1 - 310.0).abs() < 1e-3);
        assert!((bbox.x2 - 740.0).abs() < 1e-3);
        assert!((bbox.y2 - 410.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_outputs_without_class_scores() {
        let array = Array3::<f32>::zeros((1, BOX_VALUES, 5));
        let mapping = Letterbox::fit(640, 480, 640, 640, Placement::Centered);
        assert!(matches!(
            decode_predictions(array.view(), 0.4, &mapping),
            Err(Error::Detector(_))
        ));
    }
}
