//! Multi-session enrollment fusion.

use ndarray::{Array2, Axis};

use crate::error::{EngineError, EngineResult};
use crate::template::{FaceEncoding, FingerprintTemplate, MinutiaPoint, TEMPLATE_VERSION};

#[derive(Debug, Clone)]
pub struct TemplateFuser {
    /// Minutiae closer than this are treated as the same feature.
    pub dedup_tolerance: f32,
}

impl Default for TemplateFuser {
    fn default() -> Self {
        Self {
            dedup_tolerance: 5.0,
        }
    }
}

impl TemplateFuser {
    /// Element-wise mean with equal weights. A single encoding is returned as is.
    pub fn fuse_faces(&self, encodings: &[FaceEncoding]) -> EngineResult<FaceEncoding> {
        let first = encodings
            .first()
            .ok_or_else(|| EngineError::InvalidInput("no face encodings to fuse".into()))?;
        if encodings.len() == 1 {
            return Ok(first.clone());
        }

        let dim = first.len();
        if dim == 0 {
            return Err(EngineError::InvalidInput("empty face encoding".into()));
        }
        if let Some(odd) = encodings.iter().find(|e| e.len() != dim) {
            return Err(EngineError::InvalidInput(format!(
                "face encoding length mismatch: {} vs {}",
                dim,
                odd.len()
            )));
        }

        let flat: Vec<f32> = encodings
            .iter()
            .flat_map(|e| e.values().iter().copied())
            .collect();
        let stacked = Array2::from_shape_vec((encodings.len(), dim), flat)
            .map_err(|err| EngineError::InvalidInput(format!("stacking encodings: {err}")))?;
        let mean = stacked
            .mean_axis(Axis(0))
            .ok_or_else(|| EngineError::InvalidInput("no face encodings to fuse".into()))?;
        Ok(FaceEncoding::new(mean.to_vec()))
    }

    /// Union of all sessions' minutiae, deduplicated, with the mean session
    /// quality. A single template is returned as is.
    pub fn fuse_fingerprints(
        &self,
        templates: &[FingerprintTemplate],
    ) -> EngineResult<FingerprintTemplate> {
        let first = templates.first().ok_or_else(|| {
            EngineError::InvalidInput("no fingerprint templates to fuse".into())
        })?;
        if templates.len() == 1 {
            return Ok(first.clone());
        }

        let all: Vec<MinutiaPoint> = templates
            .iter()
            .flat_map(|t| t.points.iter().copied())
            .collect();
        let total = all.len();
        let points = self.dedup(all);
        log::debug!(
            "fused {} sessions: {} minutiae collapsed to {}",
            templates.len(),
            total,
            points.len()
        );

        let quality_score =
            templates.iter().map(|t| t.quality_score).sum::<f32>() / templates.len() as f32;
        Ok(FingerprintTemplate {
            points,
            quality_score,
            version: TEMPLATE_VERSION.to_string(),
            combined_from: Some(templates.len()),
        })
    }

    /// Greedy nearest-cluster collapse: a point within tolerance of an already
    /// kept point replaces it when its quality is higher and is dropped
    /// otherwise. Passes repeat until one removes nothing, so the output never
    /// holds two points within tolerance and a second call is a no-op.
    ///
    /// This is an approximation, not true clustering; the result depends on
    /// input order.
    pub fn dedup(&self, mut points: Vec<MinutiaPoint>) -> Vec<MinutiaPoint> {
        loop {
            let before = points.len();
            points = self.collapse_pass(points);
            if points.len() == before {
                return points;
            }
        }
    }

    fn collapse_pass(&self, points: Vec<MinutiaPoint>) -> Vec<MinutiaPoint> {
        let mut kept: Vec<MinutiaPoint> = Vec::with_capacity(points.len());
        for point in points {
            match kept
                .iter_mut()
                .find(|k| k.distance(&point) <= self.dedup_tolerance)
            {
                Some(existing) => {
                    if point.quality > existing.quality {
                        *existing = point;
                    }
                }
                None => kept.push(point),
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::template::MinutiaType;

    fn minutia(x: f32, y: f32, quality: f32) -> MinutiaPoint {
        MinutiaPoint {
            x,
            y,
            angle: 45.0,
            kind: MinutiaType::RidgeEnding,
            quality,
        }
    }

    fn template(points: Vec<MinutiaPoint>, quality_score: f32) -> FingerprintTemplate {
        FingerprintTemplate {
            points,
            quality_score,
            version: "1.0".into(),
            combined_from: None,
        }
    }

    #[test]
    fn face_fusion_averages_elementwise() {
        let fused = TemplateFuser::default()
            .fuse_faces(&[
                FaceEncoding::new(vec![1.0, 2.0, 3.0]),
                FaceEncoding::new(vec![3.0, 2.0, 1.0]),
                FaceEncoding::new(vec![2.0, 5.0, 2.0]),
            ])
            .unwrap();
        assert_eq!(fused.values(), &[2.0, 3.0, 2.0]);
    }

    #[test]
    fn single_session_fusion_is_identity() {
        let fuser = TemplateFuser::default();
        let enc = FaceEncoding::new(vec![0.25, -4.0]);
        assert_eq!(fuser.fuse_faces(std::slice::from_ref(&enc)).unwrap(), enc);

        // Deliberately holds near-duplicates: identity must skip dedup.
        let single = template(vec![minutia(0.0, 0.0, 0.5), minutia(1.0, 0.0, 0.9)], 0.42);
        assert_eq!(
            fuser.fuse_fingerprints(std::slice::from_ref(&single)).unwrap(),
            single
        );
    }

    #[test]
    fn fusing_nothing_is_invalid() {
        let fuser = TemplateFuser::default();
        assert_eq!(fuser.fuse_faces(&[]).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(
            fuser.fuse_fingerprints(&[]).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        let err = fuser
            .fuse_faces(&[FaceEncoding::new(vec![1.0]), FaceEncoding::new(vec![1.0, 2.0])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn fingerprint_fusion_keeps_best_duplicate() {
        let a = template(vec![minutia(10.0, 10.0, 0.7), minutia(100.0, 100.0, 0.9)], 0.8);
        let b = template(vec![minutia(12.0, 11.0, 0.95), minutia(300.0, 40.0, 0.8)], 0.6);
        let fused = TemplateFuser::default().fuse_fingerprints(&[a, b]).unwrap();

        assert_eq!(fused.points.len(), 3);
        assert!(fused.points.contains(&minutia(12.0, 11.0, 0.95)));
        assert!(!fused.points.contains(&minutia(10.0, 10.0, 0.7)));
        assert!((fused.quality_score - 0.7).abs() < 1e-6);
        assert_eq!(fused.combined_from, Some(2));
    }

    #[test]
    fn chained_replacements_are_collapsed() {
        // c replaces a, then sits within tolerance of b.
        let a = minutia(0.0, 0.0, 0.5);
        let b = minutia(8.0, 0.0, 0.6);
        let c = minutia(4.0, 0.0, 0.9);
        let fuser = TemplateFuser::default();
        let once = fuser.dedup(vec![a, b, c]);
        assert_eq!(once, vec![c]);
        assert_eq!(fuser.dedup(once.clone()), once);
    }
}
