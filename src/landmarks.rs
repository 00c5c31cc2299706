//! Canonical facial landmarks used for head pose estimation.

use crate::{
    constants::{FACE_MESH_LANDMARK_IDS, IBUG_LANDMARK_IDS, NUM_IBUG_LANDMARKS, NUM_POSE_LANDMARKS},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    /// Horizontal position, growing to the right
    pub x: f64,
    /// Vertical position, growing downwards
    pub y: f64,
}

impl LandmarkPoint {
    /// Create a new point
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The six canonical landmarks of one face.
///
/// "Left" and "right" refer to the image sides, not the subject's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub nose_tip: LandmarkPoint,
    pub chin: LandmarkPoint,
    pub left_eye_outer: LandmarkPoint,
    pub right_eye_outer: LandmarkPoint,
    pub left_mouth: LandmarkPoint,
    pub right_mouth: LandmarkPoint,
}

impl LandmarkSet {
    /// Build from points in model order: nose tip, chin, left eye outer corner,
    /// right eye outer corner, left mouth corner, right mouth corner
    #[must_use]
    pub fn from_points(points: [LandmarkPoint; NUM_POSE_LANDMARKS]) -> Self {
        let [nose_tip, chin, left_eye_outer, right_eye_outer, left_mouth, right_mouth] = points;
        Self {
            nose_tip,
            chin,
            left_eye_outer,
            right_eye_outer,
            left_mouth,
            right_mouth,
        }
    }

    /// Build from points normalized to `[0, 1]` by the image dimensions
    #[must_use]
    pub fn from_normalized(points: [(f64, f64); NUM_POSE_LANDMARKS], image_width: u32, image_height: u32) -> Self {
        let (w, h) = (f64::from(image_width), f64::from(image_height));
        Self::from_points(points.map(|(x, y)| LandmarkPoint::new(x * w, y * h)))
    }

    /// Pick the canonical points out of a normalized 468-point face mesh
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is too short to contain the canonical indices.
    pub fn from_face_mesh(mesh: &[(f64, f64)], image_width: u32, image_height: u32) -> Result<Self> {
        let points = pick(mesh, &FACE_MESH_LANDMARK_IDS, "Face mesh")?;
        Ok(Self::from_normalized(points, image_width, image_height))
    }

    /// Pick the canonical points out of 68-point (iBUG) marks in pixel coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 68 marks are given.
    pub fn from_ibug_marks(marks: &[LandmarkPoint]) -> Result<Self> {
        if marks.len() < NUM_IBUG_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected {NUM_IBUG_LANDMARKS} facial marks, got {}",
                marks.len()
            )));
        }
        Ok(Self::from_points(pick(marks, &IBUG_LANDMARK_IDS, "Facial marks")?))
    }

    /// Points in model order
    #[must_use]
    pub fn points(&self) -> [LandmarkPoint; NUM_POSE_LANDMARKS] {
        [
            self.nose_tip,
            self.chin,
            self.left_eye_outer,
            self.right_eye_outer,
            self.left_mouth,
            self.right_mouth,
        ]
    }

    /// Whether every coordinate is a finite number
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.points().iter().all(LandmarkPoint::is_finite)
    }
}

fn pick<T: Copy + Default>(
    points: &[T],
    ids: &[usize; NUM_POSE_LANDMARKS],
    source: &str,
) -> Result<[T; NUM_POSE_LANDMARKS]> {
    let mut picked = [T::default(); NUM_POSE_LANDMARKS];
    for (slot, &idx) in picked.iter_mut().zip(ids) {
        *slot = *points.get(idx).ok_or_else(|| {
            Error::InvalidInput(format!("{source} has {} points, landmark {idx} is missing", points.len()))
        })?;
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_order_roundtrip() {
        let points = [
            LandmarkPoint::new(1.0, 1.0),
            LandmarkPoint::new(2.0, 2.0),
            LandmarkPoint::new(3.0, 3.0),
            LandmarkPoint::new(4.0, 4.0),
            LandmarkPoint::new(5.0, 5.0),
            LandmarkPoint::new(6.0, 6.0),
        ];
        let set = LandmarkSet::from_points(points);
        assert_eq!(set.chin, LandmarkPoint::new(2.0, 2.0));
        assert_eq!(set.points(), points);
    }

    #[test]
    fn test_from_normalized_scales_by_image_size() {
        let set = LandmarkSet::from_normalized([(0.5, 0.5); 6], 640, 480);
        assert_eq!(set.nose_tip, LandmarkPoint::new(320.0, 240.0));
    }

    #[test]
    fn test_from_face_mesh() {
        let mesh: Vec<(f64, f64)> = (0..468).map(|i| (f64::from(i) / 1000.0, 0.25)).collect();
        let set = LandmarkSet::from_face_mesh(&mesh, 1000, 400).unwrap();
        assert!((set.nose_tip.x - 1.0).abs() < 1e-9);
        assert!((set.chin.x - 199.0).abs() < 1e-9);
        assert!((set.right_mouth.x - 291.0).abs() < 1e-9);
        assert!((set.chin.y - 100.0).abs() < 1e-9);

        assert!(LandmarkSet::from_face_mesh(&mesh[..100], 1000, 400).is_err());
    }

    #[test]
    fn test_from_ibug_marks() {
        let marks: Vec<LandmarkPoint> = (0..68).map(|i| LandmarkPoint::new(f64::from(i), 2.0 * f64::from(i))).collect();
        let set = LandmarkSet::from_ibug_marks(&marks).unwrap();
        assert_eq!(set.nose_tip, LandmarkPoint::new(30.0, 60.0));
        assert_eq!(set.chin, LandmarkPoint::new(8.0, 16.0));
        assert_eq!(set.left_eye_outer.x, 36.0);
        assert_eq!(set.right_eye_outer.x, 45.0);
        assert_eq!(set.left_mouth.x, 48.0);
        assert_eq!(set.right_mouth.x, 54.0);

        assert!(matches!(
            LandmarkSet::from_ibug_marks(&marks[..60]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_finite_detection() {
        let mut set = LandmarkSet::from_normalized([(0.5, 0.5); 6], 10, 10);
        assert!(set.is_finite());
        set.chin.y = f64::NAN;
        assert!(!set.is_finite());
    }
}
