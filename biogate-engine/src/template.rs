use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Fixed length of every face encoding compared by the engine.
pub const FACE_ENCODING_LEN: usize = 128;

pub const TEMPLATE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Face,
    Fingerprint,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Face => "face",
            Modality::Fingerprint => "fingerprint",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "face" => Ok(Modality::Face),
            "fingerprint" | "finger" => Ok(Modality::Fingerprint),
            other => Err(EngineError::InvalidInput(format!(
                "unknown modality '{other}'"
            ))),
        }
    }
}

/// Numeric face feature vector. Values are not normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEncoding(Vec<f32>);

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Builds a fixed-length encoding, truncating or zero-padding `values`
    /// to [`FACE_ENCODING_LEN`].
    pub fn fixed(mut values: Vec<f32>) -> Self {
        values.resize(FACE_ENCODING_LEN, 0.0);
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutiaType {
    RidgeEnding,
    Bifurcation,
}

/// One ridge feature of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinutiaPoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in degrees, `0..360`.
    pub angle: f32,
    #[serde(rename = "type")]
    pub kind: MinutiaType,
    /// Per-point reliability in `[0, 1]`.
    pub quality: f32,
}

impl MinutiaPoint {
    pub fn distance(&self, other: &MinutiaPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Circular angular distance in degrees, always in `[0, 180]`.
    pub fn angle_difference(&self, other: &MinutiaPoint) -> f32 {
        let diff = (self.angle - other.angle).abs() % 360.0;
        diff.min(360.0 - diff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintTemplate {
    #[serde(rename = "minutiae_points")]
    pub points: Vec<MinutiaPoint>,
    /// Cached at extraction or fusion time, never recomputed on read.
    pub quality_score: f32,
    #[serde(rename = "template_version", default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_from: Option<usize>,
}

fn default_version() -> String {
    TEMPLATE_VERSION.to_string()
}

/// A template as held by an enrollment record.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredTemplate {
    Face(FaceEncoding),
    Fingerprint(FingerprintTemplate),
}

impl StoredTemplate {
    pub fn modality(&self) -> Modality {
        match self {
            StoredTemplate::Face(_) => Modality::Face,
            StoredTemplate::Fingerprint(_) => Modality::Fingerprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(angle: f32) -> MinutiaPoint {
        MinutiaPoint {
            x: 0.0,
            y: 0.0,
            angle,
            kind: MinutiaType::Bifurcation,
            quality: 1.0,
        }
    }

    #[test]
    fn fixed_encoding_pads_and_truncates() {
        assert_eq!(FaceEncoding::fixed(vec![1.0; 10]).len(), FACE_ENCODING_LEN);
        assert_eq!(FaceEncoding::fixed(vec![1.0; 200]).len(), FACE_ENCODING_LEN);
        let padded = FaceEncoding::fixed(vec![2.0; 3]);
        assert_eq!(&padded.values()[..4], &[2.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn angle_difference_wraps_around() {
        assert_eq!(point(350.0).angle_difference(&point(10.0)), 20.0);
        assert_eq!(point(10.0).angle_difference(&point(350.0)), 20.0);
        assert_eq!(point(0.0).angle_difference(&point(180.0)), 180.0);
    }

    #[test]
    fn modality_parses_case_insensitively() {
        assert_eq!("Face".parse::<Modality>().unwrap(), Modality::Face);
        assert_eq!(
            "fingerprint".parse::<Modality>().unwrap(),
            Modality::Fingerprint
        );
        assert!("iris".parse::<Modality>().is_err());
    }

    #[test]
    fn fingerprint_template_uses_stored_field_names() {
        let template = FingerprintTemplate {
            points: vec![point(45.0)],
            quality_score: 0.8,
            version: TEMPLATE_VERSION.into(),
            combined_from: None,
        };
        let json = serde_json::to_value(&template).unwrap();
        assert!(json.get("minutiae_points").is_some());
        assert_eq!(json["minutiae_points"][0]["type"], "bifurcation");
        assert_eq!(json["template_version"], "1.0");
        assert!(json.get("combined_from").is_none());
    }
}
