pub mod capture;
pub mod config;
pub mod identity;
pub mod storage;

// Re-export engine types for convenience
pub use biogate_engine::{
    codec, BiometricEngine, EngineConfig, EngineError, Modality, OverallVerificationOutcome,
    StoredTemplate, VerificationStatus,
};
