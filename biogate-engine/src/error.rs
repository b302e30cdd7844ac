use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("capture device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("capture failed on {device}: {reason}")]
    CaptureFailed { device: String, reason: String },

    #[error("capture quality {score:.2} below threshold: {}", reasons.join("; "))]
    LowQuality {
        score: f32,
        reasons: Vec<String>,
        recommendations: Vec<String>,
    },

    #[error("feature extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("stored template is malformed: {0}")]
    MalformedTemplate(String),

    #[error("no {modality} template enrolled for {person}")]
    NotEnrolled { person: String, modality: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("template store error: {0}")]
    Storage(String),
}

/// Short machine-checkable label for an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceUnavailable,
    CaptureFailed,
    LowQuality,
    ExtractionFailed,
    MalformedTemplate,
    NotEnrolled,
    InvalidInput,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::CaptureFailed => "capture_failed",
            ErrorKind::LowQuality => "low_quality",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::MalformedTemplate => "malformed_template",
            ErrorKind::NotEnrolled => "not_enrolled",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            EngineError::CaptureFailed { .. } => ErrorKind::CaptureFailed,
            EngineError::LowQuality { .. } => ErrorKind::LowQuality,
            EngineError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            EngineError::MalformedTemplate(_) => ErrorKind::MalformedTemplate,
            EngineError::NotEnrolled { .. } => ErrorKind::NotEnrolled,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Remediation hints suitable for showing to the person being scanned.
    pub fn recommendations(&self) -> Vec<String> {
        match self {
            EngineError::LowQuality {
                recommendations, ..
            } => recommendations.clone(),
            EngineError::DeviceUnavailable { .. } => {
                vec!["Check that the capture device is connected".to_string()]
            }
            EngineError::CaptureFailed { .. } | EngineError::ExtractionFailed(_) => {
                vec!["Try the capture again".to_string()]
            }
            EngineError::NotEnrolled { .. } => vec!["Enroll this modality first".to_string()],
            EngineError::MalformedTemplate(_) => {
                vec!["Re-enroll to replace the stored template".to_string()]
            }
            EngineError::InvalidInput(_) | EngineError::Storage(_) => Vec::new(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
