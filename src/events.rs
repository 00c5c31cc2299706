//! Violation events and the final event list assembly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Kind of proctoring violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    FaceNotDetected,
    MultipleFaces,
    MobilePhoneDetected,
    CameraTampered,
    LookingAway,
    SuspiciousBehavior,
}

impl EventType {
    /// Wire name, e.g. `FACE_NOT_DETECTED`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FaceNotDetected => "FACE_NOT_DETECTED",
            Self::MultipleFaces => "MULTIPLE_FACES",
            Self::MobilePhoneDetected => "MOBILE_PHONE_DETECTED",
            Self::CameraTampered => "CAMERA_TAMPERED",
            Self::LookingAway => "LOOKING_AWAY",
            Self::SuspiciousBehavior => "SUSPICIOUS_BEHAVIOR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single detected violation. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    event_type: EventType,
    severity: Severity,
    metadata: Map<String, Value>,
}

impl ViolationEvent {
    /// Event with empty metadata
    #[must_use]
    pub fn new(event_type: EventType, severity: Severity) -> Self {
        Self {
            event_type,
            severity,
            metadata: Map::new(),
        }
    }

    /// Event with one metadata entry added
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Violation kind
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Violation severity
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Explanation attached to the event
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Concatenate rule events with the optional classifier event and keep only
/// the first event of each type.
#[must_use]
pub fn assemble(rule_events: Vec<ViolationEvent>, fused: Option<ViolationEvent>) -> Vec<ViolationEvent> {
    let mut seen = HashSet::new();
    rule_events
        .into_iter()
        .chain(fused)
        .filter(|event| seen.insert(event.event_type()))
        .collect()
}
