//! Error types for the proctoring analysis library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Input bytes are not a decodable raster image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Object or landmark detector collaborator failed
    #[error("Detector error: {0}")]
    Detector(String),

    /// Classifier artifact could not be loaded or queried
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// `ONNX` Runtime inference failed
    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialized signals or model data could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the failure was caused by the caller's input rather than
    /// by the analysis infrastructure.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidInput(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::Decode("bad bytes".to_string()).is_client_error());
        assert!(!Error::Detector("model crashed".to_string()).is_client_error());
        assert!(!Error::Classifier("missing".to_string()).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Detector("timeout".to_string());
        assert_eq!(err.to_string(), "Detector error: timeout");
    }
}
