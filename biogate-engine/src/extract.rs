use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::quality::{template_quality, validate_minutiae};
use crate::template::{
    FaceEncoding, FingerprintTemplate, MinutiaPoint, FACE_ENCODING_LEN, TEMPLATE_VERSION,
};

/// Output of an external face detection/landmark backend for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub confidence: f32,
    /// Landmark coordinates `[x, y, z]`, in backend order.
    #[serde(default)]
    pub landmarks: Vec<[f32; 3]>,
}

/// Face detection backend. `Ok(None)` means the frame holds no face.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &[u8]) -> Result<Option<FaceObservation>>;
}

/// Fingerprint minutiae backend. May return an empty set.
pub trait MinutiaeReader: Send + Sync {
    fn read(&self, scan: &[u8]) -> Result<Vec<MinutiaPoint>>;
}

/// Backend for captures that are already JSON feature buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFeatureDecoder;

#[derive(Deserialize)]
#[serde(untagged)]
enum MinutiaeBuffer {
    Points(Vec<MinutiaPoint>),
    Template {
        minutiae_points: Vec<MinutiaPoint>,
    },
}

impl FaceDetector for JsonFeatureDecoder {
    fn detect(&self, frame: &[u8]) -> Result<Option<FaceObservation>> {
        serde_json::from_slice(frame).context("decoding face feature buffer")
    }
}

impl MinutiaeReader for JsonFeatureDecoder {
    fn read(&self, scan: &[u8]) -> Result<Vec<MinutiaPoint>> {
        let buffer: MinutiaeBuffer =
            serde_json::from_slice(scan).context("decoding minutiae feature buffer")?;
        Ok(match buffer {
            MinutiaeBuffer::Points(points) => points,
            MinutiaeBuffer::Template { minutiae_points } => minutiae_points,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    pub expected_minutiae: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            expected_minutiae: 20,
        }
    }
}

impl FeatureExtractor {
    /// Flattens landmarks into a [`FACE_ENCODING_LEN`] encoding.
    pub fn extract_face(&self, observation: &FaceObservation) -> EngineResult<FaceEncoding> {
        if observation.landmarks.is_empty() {
            return Err(EngineError::ExtractionFailed(
                "no face landmarks found".into(),
            ));
        }
        let flat: Vec<f32> = observation.landmarks.iter().flatten().copied().collect();
        if flat.len() != FACE_ENCODING_LEN {
            log::debug!(
                "resizing face encoding from {} to {} values",
                flat.len(),
                FACE_ENCODING_LEN
            );
        }
        Ok(FaceEncoding::fixed(flat))
    }

    pub fn extract_fingerprint(&self, points: Vec<MinutiaPoint>) -> EngineResult<FingerprintTemplate> {
        if points.is_empty() {
            return Err(EngineError::ExtractionFailed("no minutiae found".into()));
        }
        validate_minutiae(&points)?;
        let quality_score = template_quality(&points, self.expected_minutiae);
        Ok(FingerprintTemplate {
            points,
            quality_score,
            version: TEMPLATE_VERSION.to_string(),
            combined_from: None,
        })
    }
}
