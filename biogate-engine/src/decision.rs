use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorKind};
use crate::similarity::MatchScore;

/// Steps of a single-modality verification run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    Capture,
    QualityGate,
    Extract,
    Score,
    Result,
}

impl fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationStep::Capture => "capture",
            VerificationStep::QualityGate => "quality_gate",
            VerificationStep::Extract => "extract",
            VerificationStep::Score => "score",
            VerificationStep::Result => "result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Approved,
    Partial,
    Rejected,
    #[default]
    Pending,
}

impl VerificationStatus {
    /// Fixed, order-independent truth table over the two modalities.
    pub fn from_matches(face: bool, fingerprint: bool) -> Self {
        match (face, fingerprint) {
            (true, true) => VerificationStatus::Approved,
            (true, false) | (false, true) => VerificationStatus::Partial,
            (false, false) => VerificationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityVerificationResult {
    pub attempted: bool,
    pub matched: bool,
    pub similarity: f32,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<VerificationStep>,
}

impl ModalityVerificationResult {
    /// Nothing enrolled: the run stopped before capture.
    pub fn not_attempted(err: &EngineError) -> Self {
        Self {
            attempted: false,
            matched: false,
            similarity: 0.0,
            confidence: 0.0,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            recommendations: err.recommendations(),
            failed_step: None,
        }
    }

    pub fn failed(step: VerificationStep, err: &EngineError) -> Self {
        Self {
            attempted: true,
            matched: false,
            similarity: 0.0,
            confidence: 0.0,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            recommendations: err.recommendations(),
            failed_step: Some(step),
        }
    }

    pub fn scored(score: &MatchScore) -> Self {
        Self {
            attempted: true,
            matched: score.matched,
            similarity: score.similarity,
            confidence: score.confidence,
            error: None,
            error_kind: None,
            recommendations: Vec::new(),
            failed_step: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.attempted && self.error.is_none()
    }

    /// `matched` only counts for attempted, error-free runs.
    pub fn verified(&self) -> bool {
        self.succeeded() && self.matched
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallVerificationOutcome {
    pub status: VerificationStatus,
    pub face: ModalityVerificationResult,
    pub fingerprint: ModalityVerificationResult,
}

impl OverallVerificationOutcome {
    pub fn new(face: ModalityVerificationResult, fingerprint: ModalityVerificationResult) -> Self {
        let status = VerificationStatus::from_matches(face.verified(), fingerprint.verified());
        Self {
            status,
            face,
            fingerprint,
        }
    }

    pub fn message(&self) -> &'static str {
        match (self.status, self.face.verified(), self.fingerprint.verified()) {
            (VerificationStatus::Approved, ..) => "Verification completed successfully",
            (VerificationStatus::Partial, true, _) => "Fingerprint verification failed",
            (VerificationStatus::Partial, _, _) => "Face verification failed",
            (VerificationStatus::Pending, ..) => "Verification pending",
            (VerificationStatus::Rejected, ..) => {
                "Both face and fingerprint verification failed"
            }
        }
    }
}
