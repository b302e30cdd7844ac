use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::extract::FaceObservation;
use crate::template::MinutiaPoint;

const POINT_COUNT_WEIGHT: f32 = 0.5;
const POINT_QUALITY_WEIGHT: f32 = 0.5;

pub const FACE_RECOMMENDATIONS: [&str; 3] = [
    "Position your face in the camera frame",
    "Ensure good lighting",
    "Look directly at the camera",
];

/// Usability verdict for one capture. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureQualityReport {
    pub accepted: bool,
    pub score: f32,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

impl CaptureQualityReport {
    /// Turns a rejected report into [`EngineError::LowQuality`].
    pub fn ensure_accepted(self) -> EngineResult<Self> {
        if self.accepted {
            Ok(self)
        } else {
            Err(EngineError::LowQuality {
                score: self.score,
                reasons: self.reasons,
                recommendations: self.recommendations,
            })
        }
    }
}

/// An analysed capture awaiting the quality gate.
#[derive(Debug, Clone, Copy)]
pub enum Sample<'a> {
    /// `None` when the detector found no face at all.
    Face(Option<&'a FaceObservation>),
    Fingerprint(&'a [MinutiaPoint]),
}

#[derive(Debug, Clone)]
pub struct QualityAssessor {
    pub min_face_confidence: f32,
    pub min_fingerprint_quality: f32,
    pub expected_minutiae: usize,
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self {
            min_face_confidence: 0.5,
            min_fingerprint_quality: 0.6,
            expected_minutiae: 20,
        }
    }
}

impl QualityAssessor {
    pub fn assess(&self, sample: Sample<'_>) -> EngineResult<CaptureQualityReport> {
        match sample {
            Sample::Face(observation) => self.assess_face(observation),
            Sample::Fingerprint(points) => self.assess_fingerprint(points),
        }
    }

    /// Face usability is the upstream detection confidence.
    pub fn assess_face(
        &self,
        observation: Option<&FaceObservation>,
    ) -> EngineResult<CaptureQualityReport> {
        let Some(observation) = observation else {
            return Ok(rejected_face(0.0, "no face detected in captured frame".into()));
        };
        let confidence = observation.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(EngineError::InvalidInput(format!(
                "detection confidence {confidence} outside [0, 1]"
            )));
        }
        if confidence < self.min_face_confidence {
            return Ok(rejected_face(
                confidence,
                format!(
                    "no usable face: detection confidence {confidence:.2} below {:.2}",
                    self.min_face_confidence
                ),
            ));
        }
        Ok(CaptureQualityReport {
            accepted: true,
            score: confidence,
            reasons: Vec::new(),
            recommendations: Vec::new(),
        })
    }

    pub fn assess_fingerprint(&self, points: &[MinutiaPoint]) -> EngineResult<CaptureQualityReport> {
        if points.is_empty() {
            return Err(EngineError::InvalidInput("empty minutiae set".into()));
        }
        validate_minutiae(points)?;

        let count_score = point_count_score(points.len(), self.expected_minutiae);
        let mean_quality = mean_point_quality(points);
        let score = POINT_COUNT_WEIGHT * count_score + POINT_QUALITY_WEIGHT * mean_quality;

        let mut reasons = Vec::new();
        let mut recommendations = Vec::new();
        if count_score < 1.0 {
            reasons.push(format!(
                "only {} minutiae found, expected {}",
                points.len(),
                self.expected_minutiae
            ));
            recommendations.push("Press firmly on the scanner".to_string());
            recommendations.push("Position finger correctly".to_string());
        }
        if mean_quality < self.min_fingerprint_quality {
            reasons.push(format!("mean minutia quality {mean_quality:.2} is low"));
            recommendations.push("Clean your finger".to_string());
            recommendations.push("Ensure finger is dry".to_string());
        }

        let accepted = score >= self.min_fingerprint_quality;
        if !accepted {
            reasons.insert(
                0,
                format!(
                    "fingerprint quality {score:.2} below {:.2}",
                    self.min_fingerprint_quality
                ),
            );
        }
        Ok(CaptureQualityReport {
            accepted,
            score,
            reasons,
            recommendations,
        })
    }
}

/// Rejects minutiae with non-finite coordinates or angle, or a quality
/// outside `[0, 1]`.
pub fn validate_minutiae(points: &[MinutiaPoint]) -> EngineResult<()> {
    for p in points {
        if !p.x.is_finite() || !p.y.is_finite() || !p.angle.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "minutia at ({}, {}) has non-finite fields",
                p.x, p.y
            )));
        }
        if !(0.0..=1.0).contains(&p.quality) {
            return Err(EngineError::InvalidInput(format!(
                "minutia at ({}, {}) has quality {} outside [0, 1]",
                p.x, p.y, p.quality
            )));
        }
    }
    Ok(())
}

fn rejected_face(score: f32, reason: String) -> CaptureQualityReport {
    CaptureQualityReport {
        accepted: false,
        score,
        reasons: vec![reason],
        recommendations: FACE_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect(),
    }
}

fn point_count_score(count: usize, expected: usize) -> f32 {
    if expected == 0 {
        return 1.0;
    }
    (count as f32 / expected as f32).min(1.0)
}

fn mean_point_quality(points: &[MinutiaPoint]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.quality).sum::<f32>() / points.len() as f32
}

/// Quality score cached on a freshly extracted fingerprint template.
pub fn template_quality(points: &[MinutiaPoint], expected_minutiae: usize) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    POINT_COUNT_WEIGHT * point_count_score(points.len(), expected_minutiae)
        + POINT_QUALITY_WEIGHT * mean_point_quality(points)
}
