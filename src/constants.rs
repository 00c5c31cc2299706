//! Constants used throughout the analysis pipeline

/// Number of canonical facial landmarks used for pose estimation
pub const NUM_POSE_LANDMARKS: usize = 6;

/// Face-mesh indices of the canonical landmarks, in model point order:
/// nose tip, chin, left eye outer corner, right eye outer corner,
/// left mouth corner, right mouth corner
pub const FACE_MESH_LANDMARK_IDS: [usize; NUM_POSE_LANDMARKS] = [1, 199, 33, 263, 61, 291];

/// Number of points produced by the 68-point facial landmark model
pub const NUM_IBUG_LANDMARKS: usize = 68;

/// 68-point (iBUG) indices of the canonical landmarks, in model point order
pub const IBUG_LANDMARK_IDS: [usize; NUM_POSE_LANDMARKS] = [30, 8, 36, 45, 48, 54];

/// Generic 3D face model in millimetres, origin at the nose tip,
/// y up and z towards the viewer
pub const FACE_MODEL_POINTS: [[f64; 3]; NUM_POSE_LANDMARKS] = [
    [0.0, 0.0, 0.0],
    [0.0, -63.6, -12.5],
    [-43.3, 32.7, -26.0],
    [43.3, 32.7, -26.0],
    [-28.9, -28.9, -24.1],
    [28.9, -28.9, -24.1],
];

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Head pitch (degrees) above which the candidate is looking down
pub const PITCH_DOWN_THRESHOLD: f64 = 20.0;

/// Absolute head yaw (degrees) above which the candidate is looking aside
pub const YAW_SIDE_THRESHOLD: f64 = 25.0;

/// Mean grayscale intensity below which the camera is considered covered
pub const DARK_THRESHOLD: f64 = 40.0;

/// Grayscale standard deviation below which the view is considered uniform
pub const UNIFORM_THRESHOLD: f64 = 10.0;

/// Detector label counted as a person
pub const PERSON_LABEL: &str = "person";

/// Label substrings that flag a phone
pub const PHONE_LABEL_MARKERS: [&str; 2] = ["phone", "cell"];

/// Classifier label meaning nothing suspicious was seen
pub const NO_VIOLATION_LABEL: &str = "no_violation";

/// Default object detector confidence threshold
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// Default IOU threshold for non-maximum suppression
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Default face detector confidence threshold
pub const DEFAULT_FACE_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Default IOU threshold for face non-maximum suppression
pub const DEFAULT_FACE_IOU_THRESHOLD: f32 = 0.4;

/// Faces passed on to landmark detection per frame
pub const DEFAULT_MAX_FACES: usize = 2;

/// Fraction of the face box size added on each side before landmark detection
pub const FACE_BOX_SHIFT: f32 = 0.2;

/// ITU-R BT.601 luma weights (red, green, blue)
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Rotation matrix column norm below which the decomposition is singular
pub const GIMBAL_LOCK_EPSILON: f64 = 1e-6;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
