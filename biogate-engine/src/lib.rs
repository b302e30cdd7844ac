pub mod capture;
pub mod codec;
pub mod decision;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fusion;
pub mod quality;
pub mod similarity;
pub mod store;
pub mod template;

// Re-export commonly used types
pub use capture::{CaptureDevice, CaptureSource};
pub use decision::{
    ModalityVerificationResult, OverallVerificationOutcome, VerificationStatus, VerificationStep,
};
pub use engine::{BiometricEngine, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use quality::CaptureQualityReport;
pub use extract::{FaceDetector, FaceObservation, JsonFeatureDecoder, MinutiaeReader};
pub use similarity::{MatchScore, SimilarityScorer};
pub use store::{InMemoryStore, TemplateStore};
pub use template::{
    FaceEncoding, FingerprintTemplate, MinutiaPoint, MinutiaType, Modality, StoredTemplate,
};
