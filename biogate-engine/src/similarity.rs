use std::sync::Arc;

use ndarray::ArrayView1;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::template::{FaceEncoding, FingerprintTemplate, MinutiaPoint, StoredTemplate};

/// Result of a successful comparison between two templates of one modality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchScore {
    pub similarity: f32,
    #[serde(rename = "match")]
    pub matched: bool,
    pub threshold: f32,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_points: Option<usize>,
}

impl MatchScore {
    fn new(similarity: f32, threshold: f32, matched_points: Option<usize>) -> Self {
        Self {
            similarity,
            matched: similarity > threshold,
            threshold,
            confidence: similarity,
            matched_points,
        }
    }
}

/// Cosine similarity remapped from `[-1, 1]` to `[0, 1]`.
///
/// A zero-norm encoding on either side yields `0.0`. Only direction counts:
/// `[0.1; n]` and `[0.9; n]` score `1.0`.
pub fn face_similarity(a: &FaceEncoding, b: &FaceEncoding) -> EngineResult<f32> {
    if a.is_empty() || b.is_empty() {
        return Err(EngineError::InvalidInput("empty face encoding".into()));
    }
    if a.len() != b.len() {
        return Err(EngineError::InvalidInput(format!(
            "face encoding length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.values().iter().chain(b.values()).any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidInput(
            "face encoding contains non-finite values".into(),
        ));
    }

    let a = ArrayView1::from(a.values());
    let b = ArrayView1::from(b.values());
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let cosine = (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Ok((cosine + 1.0) / 2.0)
}

/// Outcome of pairing two minutiae sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinutiaeMatch {
    pub matched_points: usize,
    pub similarity: f32,
}

/// Pairs minutiae between a reference and a probe set. Both sets are
/// non-empty when called through [`SimilarityScorer`].
pub trait MinutiaeMatcher: Send + Sync {
    fn match_points(&self, reference: &[MinutiaPoint], probe: &[MinutiaPoint]) -> MinutiaeMatch;
}

/// First-fit pairing: every reference point takes the first unpaired probe
/// point within tolerance. Not a globally optimal assignment.
#[derive(Debug, Clone)]
pub struct GreedyMatcher {
    pub spatial_tolerance: f32,
    pub angle_tolerance: f32,
}

impl Default for GreedyMatcher {
    fn default() -> Self {
        Self {
            spatial_tolerance: 10.0,
            angle_tolerance: 30.0,
        }
    }
}

impl GreedyMatcher {
    fn corresponds(&self, a: &MinutiaPoint, b: &MinutiaPoint) -> bool {
        a.kind == b.kind
            && a.distance(b) <= self.spatial_tolerance
            && a.angle_difference(b) <= self.angle_tolerance
    }
}

impl MinutiaeMatcher for GreedyMatcher {
    fn match_points(&self, reference: &[MinutiaPoint], probe: &[MinutiaPoint]) -> MinutiaeMatch {
        let possible = reference.len().min(probe.len());
        if possible == 0 {
            return MinutiaeMatch {
                matched_points: 0,
                similarity: 0.0,
            };
        }

        let mut taken = vec![false; probe.len()];
        let mut matched_points = 0;
        for point in reference {
            let hit = probe
                .iter()
                .enumerate()
                .find(|(i, candidate)| !taken[*i] && self.corresponds(point, candidate));
            if let Some((i, _)) = hit {
                taken[i] = true;
                matched_points += 1;
            }
        }

        MinutiaeMatch {
            matched_points,
            similarity: matched_points as f32 / possible as f32,
        }
    }
}

#[derive(Clone)]
pub struct SimilarityScorer {
    pub face_threshold: f32,
    pub fingerprint_threshold: f32,
    matcher: Arc<dyn MinutiaeMatcher>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(0.6, 0.7, GreedyMatcher::default())
    }
}

impl SimilarityScorer {
    pub fn new(
        face_threshold: f32,
        fingerprint_threshold: f32,
        matcher: impl MinutiaeMatcher + 'static,
    ) -> Self {
        Self {
            face_threshold,
            fingerprint_threshold,
            matcher: Arc::new(matcher),
        }
    }

    pub fn compare_faces(&self, stored: &FaceEncoding, probe: &FaceEncoding) -> EngineResult<MatchScore> {
        let similarity = face_similarity(stored, probe)?;
        Ok(MatchScore::new(similarity, self.face_threshold, None))
    }

    pub fn compare_fingerprints(
        &self,
        stored: &FingerprintTemplate,
        probe: &FingerprintTemplate,
    ) -> EngineResult<MatchScore> {
        if stored.points.is_empty() || probe.points.is_empty() {
            return Err(EngineError::InvalidInput(
                "no minutiae points in templates".into(),
            ));
        }
        let result = self.matcher.match_points(&stored.points, &probe.points);
        Ok(MatchScore::new(
            result.similarity.clamp(0.0, 1.0),
            self.fingerprint_threshold,
            Some(result.matched_points),
        ))
    }

    pub fn compare(&self, stored: &StoredTemplate, probe: &StoredTemplate) -> EngineResult<MatchScore> {
        match (stored, probe) {
            (StoredTemplate::Face(a), StoredTemplate::Face(b)) => self.compare_faces(a, b),
            (StoredTemplate::Fingerprint(a), StoredTemplate::Fingerprint(b)) => {
                self.compare_fingerprints(a, b)
            }
            _ => Err(EngineError::InvalidInput(format!(
                "cannot compare {} template with {} template",
                stored.modality(),
                probe.modality()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::template::MinutiaType;

    fn minutia(x: f32, y: f32, angle: f32, kind: MinutiaType) -> MinutiaPoint {
        MinutiaPoint {
            x,
            y,
            angle,
            kind,
            quality: 0.9,
        }
    }

    fn template(points: Vec<MinutiaPoint>) -> FingerprintTemplate {
        FingerprintTemplate {
            points,
            quality_score: 0.9,
            version: "1.0".into(),
            combined_from: None,
        }
    }

    #[test]
    fn identical_face_encodings_score_one() {
        let enc = FaceEncoding::new(vec![0.1; 128]);
        let score = SimilarityScorer::default().compare_faces(&enc, &enc).unwrap();
        assert!((score.similarity - 1.0).abs() < 1e-5);
        assert!(score.matched);
        assert_eq!(score.confidence, score.similarity);
        assert_eq!(score.threshold, 0.6);
    }

    #[test]
    fn face_similarity_ignores_magnitude() {
        let dim = FaceEncoding::new(vec![0.1; 128]);
        let bright = FaceEncoding::new(vec![0.9; 128]);
        assert!((face_similarity(&dim, &bright).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn opposite_encodings_score_zero() {
        let a = FaceEncoding::new(vec![1.0, 0.0]);
        let b = FaceEncoding::new(vec![-1.0, 0.0]);
        assert!(face_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let zero = FaceEncoding::new(vec![0.0; 128]);
        let other = FaceEncoding::new(vec![0.3; 128]);
        assert_eq!(face_similarity(&zero, &other).unwrap(), 0.0);
        assert_eq!(face_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn invalid_face_inputs_are_rejected() {
        let empty = FaceEncoding::new(vec![]);
        let short = FaceEncoding::new(vec![1.0; 3]);
        let full = FaceEncoding::new(vec![1.0; 128]);
        assert_eq!(
            face_similarity(&empty, &full).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            face_similarity(&short, &full).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn jittered_minutiae_still_match() {
        let stored = template(vec![
            minutia(100.0, 100.0, 350.0, MinutiaType::RidgeEnding),
            minutia(200.0, 150.0, 90.0, MinutiaType::Bifurcation),
        ]);
        let probe = template(vec![
            minutia(106.0, 107.0, 15.0, MinutiaType::RidgeEnding),
            minutia(203.0, 148.0, 115.0, MinutiaType::Bifurcation),
        ]);
        let score = SimilarityScorer::default()
            .compare_fingerprints(&stored, &probe)
            .unwrap();
        assert_eq!(score.matched_points, Some(2));
        assert_eq!(score.similarity, 1.0);
        assert!(score.matched);
    }

    #[test]
    fn out_of_tolerance_minutiae_do_not_match() {
        let stored = template(vec![minutia(100.0, 100.0, 90.0, MinutiaType::RidgeEnding)]);
        let far = template(vec![minutia(111.0, 100.0, 90.0, MinutiaType::RidgeEnding)]);
        let turned = template(vec![minutia(100.0, 100.0, 121.0, MinutiaType::RidgeEnding)]);
        let other_kind = template(vec![minutia(100.0, 100.0, 90.0, MinutiaType::Bifurcation)]);
        let scorer = SimilarityScorer::default();
        for probe in [far, turned, other_kind] {
            let score = scorer.compare_fingerprints(&stored, &probe).unwrap();
            assert_eq!(score.similarity, 0.0);
            assert!(!score.matched);
        }
    }

    #[test]
    fn each_probe_point_pairs_once() {
        let stored = template(vec![
            minutia(50.0, 50.0, 10.0, MinutiaType::RidgeEnding),
            minutia(52.0, 50.0, 10.0, MinutiaType::RidgeEnding),
        ]);
        let probe = template(vec![
            minutia(51.0, 50.0, 10.0, MinutiaType::RidgeEnding),
            minutia(400.0, 400.0, 10.0, MinutiaType::RidgeEnding),
        ]);
        let score = SimilarityScorer::default()
            .compare_fingerprints(&stored, &probe)
            .unwrap();
        assert_eq!(score.matched_points, Some(1));
        assert_eq!(score.similarity, 0.5);
    }

    #[test]
    fn empty_minutiae_are_invalid_input() {
        let stored = template(vec![minutia(1.0, 1.0, 1.0, MinutiaType::Bifurcation)]);
        let empty = template(vec![]);
        let err = SimilarityScorer::default()
            .compare_fingerprints(&stored, &empty)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            GreedyMatcher::default().match_points(&stored.points, &[]).similarity,
            0.0
        );
    }

    #[test]
    fn mixed_modalities_cannot_be_compared() {
        let face = StoredTemplate::Face(FaceEncoding::new(vec![1.0; 4]));
        let finger = StoredTemplate::Fingerprint(template(vec![minutia(
            1.0,
            1.0,
            1.0,
            MinutiaType::Bifurcation,
        )]));
        assert!(SimilarityScorer::default().compare(&face, &finger).is_err());
    }
}
