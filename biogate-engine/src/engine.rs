//! Enrollment and verification flows over injected capture backends.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureDevice;
use crate::codec;
use crate::decision::{ModalityVerificationResult, OverallVerificationOutcome, VerificationStep};
use crate::error::{EngineError, EngineResult};
use crate::extract::{FaceDetector, FaceObservation, FeatureExtractor, MinutiaeReader};
use crate::fusion::TemplateFuser;
use crate::quality::{CaptureQualityReport, QualityAssessor, Sample};
use crate::similarity::{GreedyMatcher, MatchScore, SimilarityScorer};
use crate::store::TemplateStore;
use crate::template::{
    FaceEncoding, FingerprintTemplate, MinutiaPoint, Modality, StoredTemplate,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub face_threshold: f32,
    pub fingerprint_threshold: f32,
    pub min_face_confidence: f32,
    pub min_fingerprint_quality: f32,
    pub expected_minutiae: usize,
    pub spatial_tolerance: f32,
    pub angle_tolerance: f32,
    pub dedup_tolerance: f32,
    pub enroll_samples: usize,
    /// Pause between enrollment samples, per modality.
    pub face_settle_ms: u64,
    pub fingerprint_settle_ms: u64,
    pub capture_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            face_threshold: 0.6,
            fingerprint_threshold: 0.7,
            min_face_confidence: 0.5,
            min_fingerprint_quality: 0.6,
            expected_minutiae: 20,
            spatial_tolerance: 10.0,
            angle_tolerance: 30.0,
            dedup_tolerance: 5.0,
            enroll_samples: 3,
            face_settle_ms: 1000,
            fingerprint_settle_ms: 2000,
            capture_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn settle(&self, modality: Modality) -> Duration {
        Duration::from_millis(match modality {
            Modality::Face => self.face_settle_ms,
            Modality::Fingerprint => self.fingerprint_settle_ms,
        })
    }

    pub fn scorer(&self) -> SimilarityScorer {
        SimilarityScorer::new(
            self.face_threshold,
            self.fingerprint_threshold,
            GreedyMatcher {
                spatial_tolerance: self.spatial_tolerance,
                angle_tolerance: self.angle_tolerance,
            },
        )
    }

    pub fn quality(&self) -> QualityAssessor {
        QualityAssessor {
            min_face_confidence: self.min_face_confidence,
            min_fingerprint_quality: self.min_fingerprint_quality,
            expected_minutiae: self.expected_minutiae,
        }
    }

    pub fn fuser(&self) -> TemplateFuser {
        TemplateFuser {
            dedup_tolerance: self.dedup_tolerance,
        }
    }

    pub fn extractor(&self) -> FeatureExtractor {
        FeatureExtractor {
            expected_minutiae: self.expected_minutiae,
        }
    }
}

struct FaceBackend {
    device: CaptureDevice,
    detector: Box<dyn FaceDetector>,
}

struct FingerprintBackend {
    device: CaptureDevice,
    reader: Box<dyn MinutiaeReader>,
}

/// A step-tagged failure inside one modality run.
struct StepFailure {
    step: VerificationStep,
    error: EngineError,
}

impl StepFailure {
    fn at(step: VerificationStep) -> impl FnOnce(EngineError) -> StepFailure {
        move |error| StepFailure { step, error }
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    face: Option<FaceBackend>,
    fingerprint: Option<FingerprintBackend>,
    store: Option<Arc<dyn TemplateStore>>,
}

impl EngineBuilder {
    pub fn face(mut self, device: CaptureDevice, detector: impl FaceDetector + 'static) -> Self {
        self.face = Some(FaceBackend {
            device,
            detector: Box::new(detector),
        });
        self
    }

    pub fn fingerprint(
        mut self,
        device: CaptureDevice,
        reader: impl MinutiaeReader + 'static,
    ) -> Self {
        self.fingerprint = Some(FingerprintBackend {
            device,
            reader: Box::new(reader),
        });
        self
    }

    pub fn store(mut self, store: Arc<dyn TemplateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> BiometricEngine {
        let config = self.config;
        BiometricEngine {
            quality: config.quality(),
            extractor: config.extractor(),
            scorer: config.scorer(),
            fuser: config.fuser(),
            face: self.face,
            fingerprint: self.fingerprint,
            store: self.store,
            config,
        }
    }
}

/// Owns the capture devices for its lifetime; matching itself is stateless,
/// so one engine can serve concurrent requests.
pub struct BiometricEngine {
    config: EngineConfig,
    quality: QualityAssessor,
    extractor: FeatureExtractor,
    scorer: SimilarityScorer,
    fuser: TemplateFuser,
    face: Option<FaceBackend>,
    fingerprint: Option<FingerprintBackend>,
    store: Option<Arc<dyn TemplateStore>>,
}

impl BiometricEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            face: None,
            fingerprint: None,
            store: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Captures `num_samples` sessions and fuses them into one template.
    ///
    /// Any failing sample aborts the whole enrollment and nothing is stored.
    pub fn enroll(
        &self,
        person: &str,
        modality: Modality,
        num_samples: usize,
    ) -> EngineResult<StoredTemplate> {
        if num_samples == 0 {
            return Err(EngineError::InvalidInput(
                "enrollment needs at least one sample".into(),
            ));
        }
        log::info!("Enrolling {modality} for {person} from {num_samples} sample(s)");

        let mut samples = Vec::with_capacity(num_samples);
        for i in 0..num_samples {
            log::info!("Capturing {modality} sample {}/{num_samples}", i + 1);
            let sample = self.capture_template(modality).map_err(|failure| {
                log::warn!(
                    "Sample {}/{num_samples} failed at {}: {}",
                    i + 1,
                    failure.step,
                    failure.error
                );
                failure.error
            })?;
            samples.push(sample);

            if i + 1 < num_samples {
                std::thread::sleep(self.config.settle(modality));
            }
        }

        let fused = self.fuse(samples)?;
        let encoded = codec::encode_template(&fused)?;
        if let Some(store) = &self.store {
            store
                .persist_template(person, modality, &encoded)
                .map_err(|err| EngineError::Storage(format!("{err:#}")))?;
        }
        log::info!("✓ {modality} enrolled for {person}");
        Ok(fused)
    }

    /// Runs one modality through capture, quality gate, extraction and scoring
    /// against `stored` (encoded text). `None` means nothing is enrolled.
    pub fn verify(
        &self,
        person: &str,
        modality: Modality,
        stored: Option<&str>,
    ) -> ModalityVerificationResult {
        let Some(stored) = stored else {
            let err = EngineError::NotEnrolled {
                person: person.to_string(),
                modality: modality.to_string(),
            };
            log::info!("{err}");
            return ModalityVerificationResult::not_attempted(&err);
        };

        match self.run_verification(modality, stored) {
            Ok(score) => {
                log::info!(
                    "{modality} match score {:.3} (threshold {:.3}) for {person}",
                    score.similarity,
                    score.threshold
                );
                ModalityVerificationResult::scored(&score)
            }
            Err(failure) => {
                log::warn!(
                    "{modality} verification for {person} failed at {}: {}",
                    failure.step,
                    failure.error
                );
                ModalityVerificationResult::failed(failure.step, &failure.error)
            }
        }
    }

    /// Verifies both modalities and records the combined outcome.
    pub fn verify_all(
        &self,
        person: &str,
        stored_face: Option<&str>,
        stored_fingerprint: Option<&str>,
    ) -> OverallVerificationOutcome {
        let face = self.verify(person, Modality::Face, stored_face);
        let fingerprint = self.verify(person, Modality::Fingerprint, stored_fingerprint);
        let outcome = OverallVerificationOutcome::new(face, fingerprint);
        log::info!(
            "Verification of {person}: {:?} ({})",
            outcome.status,
            outcome.message()
        );

        if let Some(store) = &self.store {
            if let Err(err) = store.persist_outcome(person, &outcome) {
                log::warn!("Failed to record verification outcome for {person}: {err:#}");
            }
        }
        outcome
    }

    /// Looks up both stored templates and runs [`Self::verify_all`].
    pub fn verify_enrolled(&self, person: &str) -> EngineResult<OverallVerificationOutcome> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EngineError::Storage("no template store configured".into()))?;
        let lookup = |modality| {
            store
                .lookup_template(person, modality)
                .map_err(|err| EngineError::Storage(format!("{err:#}")))
        };
        let face = lookup(Modality::Face)?;
        let fingerprint = lookup(Modality::Fingerprint)?;
        Ok(self.verify_all(person, face.as_deref(), fingerprint.as_deref()))
    }

    /// Captures one sample and grades it without matching or storing
    /// anything. A rejected capture is returned as a report carrying its
    /// reasons and recommendations rather than as an error.
    pub fn assess_capture(&self, modality: Modality) -> EngineResult<CaptureQualityReport> {
        let report = match modality {
            Modality::Face => {
                let observation = self.observe_face().map_err(|failure| failure.error)?;
                self.quality.assess(Sample::Face(observation.as_ref()))?
            }
            Modality::Fingerprint => {
                let points = self.read_minutiae().map_err(|failure| failure.error)?;
                self.quality.assess(Sample::Fingerprint(&points))?
            }
        };
        log::info!(
            "{modality} capture quality {:.3} ({})",
            report.score,
            if report.accepted { "accepted" } else { "rejected" }
        );
        Ok(report)
    }

    /// Releases and stops all capture devices.
    pub fn shutdown(&self) {
        if let Some(face) = &self.face {
            face.device.shutdown();
        }
        if let Some(fingerprint) = &self.fingerprint {
            fingerprint.device.shutdown();
        }
    }

    fn run_verification(&self, modality: Modality, stored: &str) -> Result<MatchScore, StepFailure> {
        // Decoded before capturing; failures still report the SCORE step.
        let stored = codec::decode_template(modality, stored)
            .map_err(StepFailure::at(VerificationStep::Score))?;
        let probe = self.capture_template(modality)?;
        self.scorer
            .compare(&stored, &probe)
            .map_err(StepFailure::at(VerificationStep::Score))
    }

    /// CAPTURE → QUALITY_GATE → EXTRACT for one sample.
    fn capture_template(&self, modality: Modality) -> Result<StoredTemplate, StepFailure> {
        match modality {
            Modality::Face => self.capture_face().map(StoredTemplate::Face),
            Modality::Fingerprint => self.capture_fingerprint().map(StoredTemplate::Fingerprint),
        }
    }

    fn capture_face(&self) -> Result<FaceEncoding, StepFailure> {
        let observation = self.observe_face()?;
        let report = self
            .quality
            .assess(Sample::Face(observation.as_ref()))
            .and_then(|report| report.ensure_accepted())
            .map_err(StepFailure::at(VerificationStep::QualityGate))?;
        log::debug!("face capture accepted with quality {:.3}", report.score);

        match observation {
            Some(observation) => self
                .extractor
                .extract_face(&observation)
                .map_err(StepFailure::at(VerificationStep::Extract)),
            None => Err(StepFailure {
                step: VerificationStep::Extract,
                error: EngineError::ExtractionFailed("no face found".into()),
            }),
        }
    }

    fn capture_fingerprint(&self) -> Result<FingerprintTemplate, StepFailure> {
        let points = self.read_minutiae()?;
        let report = self
            .quality
            .assess(Sample::Fingerprint(&points))
            .and_then(|report| report.ensure_accepted())
            .map_err(StepFailure::at(VerificationStep::QualityGate))?;
        log::debug!(
            "fingerprint capture accepted: {} minutiae, quality {:.3}",
            points.len(),
            report.score
        );

        self.extractor
            .extract_fingerprint(points)
            .map_err(StepFailure::at(VerificationStep::Extract))
    }

    /// CAPTURE plus detection: `None` when the frame holds no face.
    fn observe_face(&self) -> Result<Option<FaceObservation>, StepFailure> {
        let backend = self
            .face
            .as_ref()
            .ok_or_else(|| missing_device(Modality::Face))
            .map_err(StepFailure::at(VerificationStep::Capture))?;

        let frame = backend
            .device
            .capture()
            .map_err(StepFailure::at(VerificationStep::Capture))?;
        backend
            .detector
            .detect(&frame)
            .map_err(|err| EngineError::CaptureFailed {
                device: backend.device.name().to_string(),
                reason: format!("unusable frame: {err:#}"),
            })
            .map_err(StepFailure::at(VerificationStep::Capture))
    }

    /// CAPTURE plus minutiae reading. An empty set fails at EXTRACT.
    fn read_minutiae(&self) -> Result<Vec<MinutiaPoint>, StepFailure> {
        let backend = self
            .fingerprint
            .as_ref()
            .ok_or_else(|| missing_device(Modality::Fingerprint))
            .map_err(StepFailure::at(VerificationStep::Capture))?;

        let scan = backend
            .device
            .capture()
            .map_err(StepFailure::at(VerificationStep::Capture))?;
        let points = backend
            .reader
            .read(&scan)
            .map_err(|err| EngineError::CaptureFailed {
                device: backend.device.name().to_string(),
                reason: format!("unreadable scan: {err:#}"),
            })
            .map_err(StepFailure::at(VerificationStep::Capture))?;

        // Nothing to score: report as an extraction failure rather than bad input.
        if points.is_empty() {
            return Err(StepFailure {
                step: VerificationStep::Extract,
                error: EngineError::ExtractionFailed("no minutiae found".into()),
            });
        }
        Ok(points)
    }

    fn fuse(&self, samples: Vec<StoredTemplate>) -> EngineResult<StoredTemplate> {
        let modality = samples
            .first()
            .map(StoredTemplate::modality)
            .ok_or_else(|| EngineError::InvalidInput("no samples to fuse".into()))?;
        match modality {
            Modality::Face => {
                let encodings: Vec<FaceEncoding> = samples
                    .into_iter()
                    .filter_map(|s| match s {
                        StoredTemplate::Face(e) => Some(e),
                        StoredTemplate::Fingerprint(_) => None,
                    })
                    .collect();
                self.fuser.fuse_faces(&encodings).map(StoredTemplate::Face)
            }
            Modality::Fingerprint => {
                let templates: Vec<FingerprintTemplate> = samples
                    .into_iter()
                    .filter_map(|s| match s {
                        StoredTemplate::Fingerprint(t) => Some(t),
                        StoredTemplate::Face(_) => None,
                    })
                    .collect();
                self.fuser
                    .fuse_fingerprints(&templates)
                    .map(StoredTemplate::Fingerprint)
            }
        }
    }
}

fn missing_device(modality: Modality) -> EngineError {
    EngineError::DeviceUnavailable {
        device: modality.to_string(),
        reason: "no capture device configured".into(),
    }
}
