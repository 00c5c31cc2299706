use crate::{
    constants::{CAMERA_CENTER_FACTOR, EPSILON, FACE_MODEL_POINTS, GIMBAL_LOCK_EPSILON, NUM_POSE_LANDMARKS},
    landmarks::{LandmarkPoint, LandmarkSet},
};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, Matrix3, Rotation3, SMatrix, SVector, Vector3, Vector6, U12, U6};
use serde::{Deserialize, Serialize};

type Residuals = SVector<f64, { NUM_POSE_LANDMARKS * 2 }>;
type Jacobian = SMatrix<f64, { NUM_POSE_LANDMARKS * 2 }, 6>;

/// Initial head orientations (pitch, yaw in degrees) tried by the solver
const SEED_ORIENTATIONS: [(f64, f64); 9] = [
    (0.0, 0.0),
    (30.0, 0.0),
    (-30.0, 0.0),
    (0.0, 45.0),
    (0.0, -45.0),
    (30.0, 45.0),
    (30.0, -45.0),
    (-30.0, 45.0),
    (-30.0, -45.0),
];

/// Head orientation relative to facing the camera, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadAngles {
    /// Rotation about the horizontal axis, positive when looking down
    pub pitch: f64,
    /// Rotation about the vertical axis
    pub yaw: f64,
}

/// Pinhole camera approximated from the image size alone.
///
/// Focal length equals the image width, the principal point is the image
/// center and there is no lens distortion. This is not a calibrated model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal_length: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl CameraIntrinsics {
    /// Approximate intrinsics for an image of the given size
    #[must_use]
    pub fn from_image_size(image_width: u32, image_height: u32) -> Self {
        Self {
            focal_length: f64::from(image_width),
            center_x: f64::from(image_width) / CAMERA_CENTER_FACTOR,
            center_y: f64::from(image_height) / CAMERA_CENTER_FACTOR,
        }
    }

    /// Camera matrix `K`
    #[must_use]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal_length,
            0.0,
            self.center_x,
            0.0,
            self.focal_length,
            self.center_y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Project a point in camera coordinates onto the image plane.
    ///
    /// Returns `None` for points on or behind the camera plane.
    #[must_use]
    pub fn project(&self, point: &Vector3<f64>) -> Option<LandmarkPoint> {
        if point.z <= EPSILON {
            return None;
        }
        Some(LandmarkPoint::new(
            self.focal_length * point.x / point.z + self.center_x,
            self.focal_length * point.y / point.z + self.center_y,
        ))
    }
}

/// Result of a perspective-n-point solve
#[derive(Debug, Clone, Copy)]
pub struct PnpSolution {
    /// Head rotation from model to camera coordinates
    pub rotation: Rotation3<f64>,
    /// Position of the nose tip in camera coordinates (millimetres)
    pub translation: Vector3<f64>,
    /// Root mean square reprojection error in pixels
    pub reprojection_error: f64,
}

/// Head pose estimator using a generic 3D face model and a `PnP` solve
#[derive(Debug, Clone)]
pub struct HeadPoseEstimator {
    model_points: [Vector3<f64>; NUM_POSE_LANDMARKS],
}

impl Default for HeadPoseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadPoseEstimator {
    /// Create an estimator with the built-in face model.
    ///
    /// The model is stored in camera axes (x right, y down, z away from the
    /// camera) so that a face looking straight into the lens has zero pitch
    /// and yaw.
    #[must_use]
    pub fn new() -> Self {
        let model_points = FACE_MODEL_POINTS.map(|[x, y, z]| Vector3::new(x, -y, -z));
        Self { model_points }
    }

    /// Model points in camera axes, in landmark order
    #[must_use]
    pub fn model_points(&self) -> &[Vector3<f64>; NUM_POSE_LANDMARKS] {
        &self.model_points
    }

    /// Estimate pitch and yaw from one face's landmarks.
    ///
    /// Uses [`CameraIntrinsics::from_image_size`], so angles are approximate.
    /// Returns `None` when the solve does not converge or the input is degenerate.
    #[must_use]
    pub fn estimate(&self, landmarks: &LandmarkSet, image_height: u32, image_width: u32) -> Option<HeadAngles> {
        if image_width == 0 || image_height == 0 || !landmarks.is_finite() {
            return None;
        }
        let camera = CameraIntrinsics::from_image_size(image_width, image_height);
        let solution = self.solve_pnp(&landmarks.points(), &camera)?;
        log::debug!(
            "PnP solved with reprojection error {:.3}px, translation {:?}",
            solution.reprojection_error,
            solution.translation
        );
        let angles = Self::rotation_matrix_to_euler(solution.rotation.matrix());
        (angles.pitch.is_finite() && angles.yaw.is_finite()).then_some(angles)
    }

    /// Solve for the rotation and translation mapping the model points onto
    /// the observed image points.
    ///
    /// Runs Levenberg-Marquardt from several seed orientations and keeps the
    /// converged solution with the lowest reprojection error.
    #[must_use]
    pub fn solve_pnp(
        &self,
        image_points: &[LandmarkPoint; NUM_POSE_LANDMARKS],
        camera: &CameraIntrinsics,
    ) -> Option<PnpSolution> {
        SEED_ORIENTATIONS
            .iter()
            .filter_map(|&(pitch, yaw)| {
                let seed = Rotation3::from_euler_angles(pitch.to_radians(), yaw.to_radians(), 0.0);
                let initial = self.initial_guess(&seed, image_points, camera)?;
                self.refine(initial, image_points, camera)
            })
            .min_by(|a, b| a.reprojection_error.total_cmp(&b.reprojection_error))
    }

    /// Translation guess that places the rotated model over the observed points
    #[allow(clippy::cast_precision_loss)]
    fn initial_guess(
        &self,
        rotation: &Rotation3<f64>,
        image_points: &[LandmarkPoint; NUM_POSE_LANDMARKS],
        camera: &CameraIntrinsics,
    ) -> Option<Vector6<f64>> {
        let n = NUM_POSE_LANDMARKS as f64;
        let rotated: Vec<Vector3<f64>> = self.model_points.iter().map(|p| rotation * p).collect();
        let model_centroid = rotated.iter().sum::<Vector3<f64>>() / n;
        let model_spread = (rotated
            .iter()
            .map(|p| (p.xy() - model_centroid.xy()).norm_squared())
            .sum::<f64>()
            / n)
            .sqrt();

        let (mx, my) = image_points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x / n, sy + p.y / n));
        let image_spread = (image_points
            .iter()
            .map(|p| (p.x - mx).powi(2) + (p.y - my).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        if image_spread < EPSILON || model_spread < EPSILON {
            return None;
        }

        let depth = camera.focal_length * model_spread / image_spread;
        let translation = Vector3::new(
            (mx - camera.center_x) * depth / camera.focal_length - model_centroid.x,
            (my - camera.center_y) * depth / camera.focal_length - model_centroid.y,
            depth - model_centroid.z,
        );
        let axis = rotation.scaled_axis();

        Some(Vector6::new(axis.x, axis.y, axis.z, translation.x, translation.y, translation.z))
    }

    /// Levenberg-Marquardt refinement of `[axis-angle, translation]`
    fn refine(
        &self,
        initial: Vector6<f64>,
        image_points: &[LandmarkPoint; NUM_POSE_LANDMARKS],
        camera: &CameraIntrinsics,
    ) -> Option<PnpSolution> {
        let problem = ReprojectionProblem {
            model_points: &self.model_points,
            image_points,
            camera,
            params: initial,
        };
        let (solved, report) = LevenbergMarquardt::new().minimize(problem);

        if !report.termination.was_successful() || !report.objective_function.is_finite() {
            log::debug!("PnP seed rejected: {:?}", report.termination);
            return None;
        }

        let params = solved.params;
        let translation = Vector3::new(params[3], params[4], params[5]);
        if translation.z <= 0.0 {
            return None;
        }

        // The objective is half the squared residual norm
        #[allow(clippy::cast_precision_loss)]
        let reprojection_error = (2.0 * report.objective_function / NUM_POSE_LANDMARKS as f64).sqrt();

        Some(PnpSolution {
            rotation: Rotation3::new(Vector3::new(params[0], params[1], params[2])),
            translation,
            reprojection_error,
        })
    }

    /// Decompose a rotation matrix into pitch and yaw in degrees.
    ///
    /// Falls back to a reduced decomposition when `sqrt(R00² + R10²)` is
    /// close to zero (yaw near ±90°), so the result is never NaN.
    #[must_use]
    pub fn rotation_matrix_to_euler(rotation_matrix: &Matrix3<f64>) -> HeadAngles {
        let r = rotation_matrix;
        let sy = (r[(0, 0)].powi(2) + r[(1, 0)].powi(2)).sqrt();

        let (pitch, yaw) = if sy > GIMBAL_LOCK_EPSILON {
            (r[(2, 1)].atan2(r[(2, 2)]), (-r[(2, 0)]).atan2(sy))
        } else {
            ((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy))
        };

        HeadAngles {
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
        }
    }
}

/// Reprojection least-squares problem over `[axis-angle, translation]`
struct ReprojectionProblem<'a> {
    model_points: &'a [Vector3<f64>; NUM_POSE_LANDMARKS],
    image_points: &'a [LandmarkPoint; NUM_POSE_LANDMARKS],
    camera: &'a CameraIntrinsics,
    params: Vector6<f64>,
}

impl ReprojectionProblem<'_> {
    fn rotation_axis(&self) -> Vector3<f64> {
        Vector3::new(self.params[0], self.params[1], self.params[2])
    }

    fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.params[3], self.params[4], self.params[5])
    }
}

impl LeastSquaresProblem<f64, U12, U6> for ReprojectionProblem<'_> {
    type ResidualStorage = Owned<f64, U12>;
    type JacobianStorage = Owned<f64, U12, U6>;
    type ParameterStorage = Owned<f64, U6>;

    fn set_params(&mut self, params: &Vector6<f64>) {
        self.params = *params;
    }

    fn params(&self) -> Vector6<f64> {
        self.params
    }

    /// `None` if any model point falls behind the camera
    fn residuals(&self) -> Option<Residuals> {
        let rotation = Rotation3::new(self.rotation_axis());
        let translation = self.translation();

        let mut residuals = Residuals::zeros();
        for (i, (model, observed)) in self.model_points.iter().zip(self.image_points).enumerate() {
            let projected = self.camera.project(&(rotation * model + translation))?;
            residuals[2 * i] = projected.x - observed.x;
            residuals[2 * i + 1] = projected.y - observed.y;
        }
        residuals.iter().all(|r| r.is_finite()).then_some(residuals)
    }

    fn jacobian(&self) -> Option<Jacobian> {
        let axis = self.rotation_axis();
        let rotation = Rotation3::new(axis);
        let derivatives = rotation_derivatives(&axis, rotation.matrix());
        let translation = self.translation();
        let f = self.camera.focal_length;

        let mut jacobian = Jacobian::zeros();
        for (i, model) in self.model_points.iter().enumerate() {
            let point = rotation * model + translation;
            if point.z <= EPSILON {
                return None;
            }
            let inv_z = 1.0 / point.z;
            // Rows of d(u, v) / d(point)
            let du = Vector3::new(f * inv_z, 0.0, -f * point.x * inv_z * inv_z);
            let dv = Vector3::new(0.0, f * inv_z, -f * point.y * inv_z * inv_z);

            for (k, derivative) in derivatives.iter().enumerate() {
                let dp = derivative * model;
                jacobian[(2 * i, k)] = du.dot(&dp);
                jacobian[(2 * i + 1, k)] = dv.dot(&dp);
            }
            for k in 0..3 {
                jacobian[(2 * i, 3 + k)] = du[k];
                jacobian[(2 * i + 1, 3 + k)] = dv[k];
            }
        }
        Some(jacobian)
    }
}

/// Derivatives of `R(v)` with respect to each axis-angle component.
///
/// Uses `dR/dv_i = (v_i [v]x + [v x (I - R) e_i]x) R / |v|^2`, which reduces
/// to `[e_i]x` at the identity.
fn rotation_derivatives(axis: &Vector3<f64>, rotation: &Matrix3<f64>) -> [Matrix3<f64>; 3] {
    let theta_sq = axis.norm_squared();
    std::array::from_fn(|i| {
        let e = Vector3::ith(i, 1.0);
        if theta_sq < EPSILON {
            return e.cross_matrix();
        }
        let lever = axis.cross(&((Matrix3::identity() - rotation) * e));
        (axis[i] * axis.cross_matrix() + lever.cross_matrix()) * rotation / theta_sq
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_model(
        estimator: &HeadPoseEstimator,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
        camera: &CameraIntrinsics,
    ) -> [LandmarkPoint; NUM_POSE_LANDMARKS] {
        estimator
            .model_points()
            .map(|p| camera.project(&(rotation * p + translation)).unwrap())
    }

    #[test]
    fn test_euler_angle_conversion() {
        // Test with identity matrix
        let angles = HeadPoseEstimator::rotation_matrix_to_euler(&Matrix3::identity());
        assert!(angles.pitch.abs() < 1e-9);
        assert!(angles.yaw.abs() < 1e-9);

        let rotation = Rotation3::from_euler_angles(25f64.to_radians(), -10f64.to_radians(), 0.0);
        let angles = HeadPoseEstimator::rotation_matrix_to_euler(rotation.matrix());
        assert!((angles.pitch - 25.0).abs() < 1e-9);
        assert!((angles.yaw + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_euler_gimbal_lock_is_finite() {
        let rotation = Rotation3::from_euler_angles(0.3, std::f64::consts::FRAC_PI_2, 0.0);
        let angles = HeadPoseEstimator::rotation_matrix_to_euler(rotation.matrix());
        assert!(angles.pitch.is_finite());
        assert!((angles.yaw - 90.0).abs() < 1e-6);

        let exact = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0);
        let angles = HeadPoseEstimator::rotation_matrix_to_euler(&exact);
        assert!(angles.pitch.abs() < 1e-9);
        assert!((angles.yaw - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_camera_matrix_from_image_size() {
        let camera = CameraIntrinsics::from_image_size(640, 480);
        let k = camera.matrix();
        assert_eq!(k[(0, 0)], 640.0);
        assert_eq!(k[(1, 1)], 640.0);
        assert_eq!(k[(0, 2)], 320.0);
        assert_eq!(k[(1, 2)], 240.0);
        assert!(camera.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_frontal_face_has_zero_angles() {
        let estimator = HeadPoseEstimator::new();
        let camera = CameraIntrinsics::from_image_size(640, 480);
        let points = project_model(&estimator, &Rotation3::identity(), &Vector3::new(0.0, 0.0, 600.0), &camera);

        let angles = estimator
            .estimate(&LandmarkSet::from_points(points), 480, 640)
            .unwrap();
        assert!(angles.pitch.abs() < 0.5, "pitch {}", angles.pitch);
        assert!(angles.yaw.abs() < 0.5, "yaw {}", angles.yaw);
    }

    #[test]
    fn test_recovers_synthetic_pose() {
        let estimator = HeadPoseEstimator::new();
        let camera = CameraIntrinsics::from_image_size(640, 480);
        let rotation = Rotation3::from_euler_angles(15f64.to_radians(), -30f64.to_radians(), 0.0);
        let translation = Vector3::new(20.0, -10.0, 550.0);
        let points = project_model(&estimator, &rotation, &translation, &camera);

        let solution = estimator.solve_pnp(&points, &camera).unwrap();
        assert!(solution.reprojection_error < 1e-3);
        assert!((solution.translation - translation).norm() < 1.0);

        let angles = HeadPoseEstimator::rotation_matrix_to_euler(solution.rotation.matrix());
        assert!((angles.pitch - 15.0).abs() < 1.0, "pitch {}", angles.pitch);
        assert!((angles.yaw + 30.0).abs() < 1.0, "yaw {}", angles.yaw);
    }

    #[test]
    fn test_analytic_jacobian_matches_finite_differences() {
        let estimator = HeadPoseEstimator::new();
        let camera = CameraIntrinsics::from_image_size(640, 480);
        let rotation = Rotation3::from_euler_angles(10f64.to_radians(), -20f64.to_radians(), 0.0);
        let points = project_model(&estimator, &rotation, &Vector3::new(5.0, 3.0, 600.0), &camera);
        let problem_at = |params: Vector6<f64>| ReprojectionProblem {
            model_points: estimator.model_points(),
            image_points: &points,
            camera: &camera,
            params,
        };

        for params in [
            Vector6::new(0.2, -0.35, 0.1, 10.0, -5.0, 580.0),
            Vector6::new(0.0, 0.0, 0.0, 0.0, 0.0, 600.0),
        ] {
            let analytic = problem_at(params).jacobian().unwrap();
            for j in 0..6 {
                let h = 1e-6 * params[j].abs().max(1.0);
                let mut forward = params;
                let mut backward = params;
                forward[j] += h;
                backward[j] -= h;
                let numeric = (problem_at(forward).residuals().unwrap() - problem_at(backward).residuals().unwrap())
                    / (2.0 * h);
                let column = analytic.column(j);
                assert!(
                    (column - numeric).norm() < 1e-4 * numeric.norm().max(1.0),
                    "column {j}: analytic {column:?}, numeric {numeric:?}"
                );
            }
        }
    }

    #[test]
    fn test_degenerate_landmarks() {
        let estimator = HeadPoseEstimator::new();
        let collapsed = LandmarkSet::from_points([LandmarkPoint::new(100.0, 100.0); NUM_POSE_LANDMARKS]);
        assert!(estimator.estimate(&collapsed, 480, 640).is_none());

        let mut broken = LandmarkSet::from_points([LandmarkPoint::new(100.0, 100.0); NUM_POSE_LANDMARKS]);
        broken.chin = LandmarkPoint::new(f64::NAN, 0.0);
        assert!(estimator.estimate(&broken, 480, 640).is_none());

        let points = project_model(
            &estimator,
            &Rotation3::identity(),
            &Vector3::new(0.0, 0.0, 600.0),
            &CameraIntrinsics::from_image_size(640, 480),
        );
        assert!(estimator.estimate(&LandmarkSet::from_points(points), 0, 640).is_none());
    }
}
