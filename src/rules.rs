//! Threshold rules mapping frame features to violation events.

use crate::{
    constants::{PITCH_DOWN_THRESHOLD, YAW_SIDE_THRESHOLD},
    events::{EventType, Severity, ViolationEvent},
    features::FeatureRecord,
    pose_estimation::HeadAngles,
};

/// Rule engine evaluating a fixed sequence of independent rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleEngine {
    pitch_down: f64,
    yaw_side: f64,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(PITCH_DOWN_THRESHOLD, YAW_SIDE_THRESHOLD)
    }
}

impl RuleEngine {
    /// Create a rule engine with custom gaze thresholds in degrees
    #[must_use]
    pub fn new(pitch_down: f64, yaw_side: f64) -> Self {
        Self { pitch_down, yaw_side }
    }

    /// Evaluate all rules in order.
    ///
    /// Gaze rules only fire when head angles were actually measured; the
    /// zero pitch/yaw placeholders in `features` never trigger them.
    #[must_use]
    pub fn evaluate(&self, features: &FeatureRecord, head_angles: Option<HeadAngles>) -> Vec<ViolationEvent> {
        let mut events = Vec::new();

        if features.person_count == 0 {
            events.push(ViolationEvent::new(EventType::FaceNotDetected, Severity::High));
        } else if features.person_count > 1 {
            events.push(
                ViolationEvent::new(EventType::MultipleFaces, Severity::High)
                    .with_metadata("persons_detected", features.person_count),
            );
        }

        if features.phone_flag == 1 {
            events.push(ViolationEvent::new(EventType::MobilePhoneDetected, Severity::High));
        }

        if features.occlusion_flag == 1 {
            events.push(ViolationEvent::new(EventType::CameraTampered, Severity::Medium));
        }

        if let Some(angles) = head_angles {
            if angles.pitch > self.pitch_down {
                events.push(ViolationEvent::new(EventType::LookingAway, Severity::Low).with_metadata("direction", "down"));
            }
            if angles.yaw.abs() > self.yaw_side {
                events.push(
                    ViolationEvent::new(EventType::LookingAway, Severity::Medium).with_metadata("direction", "side"),
                );
            }
        }

        log::debug!("Rules produced {} event(s)", events.len());
        events
    }
}
