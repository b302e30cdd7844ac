//! Opaque text form of stored templates: UTF-8 JSON of the structured value,
//! then standard base64.

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::template::{FaceEncoding, FingerprintTemplate, Modality, StoredTemplate};

pub fn encode<T: Serialize>(value: &T) -> EngineResult<String> {
    let json = serde_json::to_vec(value)
        .map_err(|err| EngineError::InvalidInput(format!("template not serializable: {err}")))?;
    Ok(general_purpose::STANDARD.encode(json))
}

pub fn decode<T: DeserializeOwned>(text: &str) -> EngineResult<T> {
    let bytes = general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|err| EngineError::MalformedTemplate(format!("invalid base64: {err}")))?;
    let json = std::str::from_utf8(&bytes)
        .map_err(|err| EngineError::MalformedTemplate(format!("invalid utf-8: {err}")))?;
    serde_json::from_str(json)
        .map_err(|err| EngineError::MalformedTemplate(format!("invalid json: {err}")))
}

pub fn encode_template(template: &StoredTemplate) -> EngineResult<String> {
    match template {
        StoredTemplate::Face(encoding) => encode(encoding),
        StoredTemplate::Fingerprint(template) => encode(template),
    }
}

/// Decodes stored text for `modality`, rejecting structurally empty templates.
pub fn decode_template(modality: Modality, text: &str) -> EngineResult<StoredTemplate> {
    match modality {
        Modality::Face => {
            let encoding: FaceEncoding = decode(text)?;
            if encoding.is_empty() {
                return Err(EngineError::MalformedTemplate(
                    "face encoding has no values".into(),
                ));
            }
            Ok(StoredTemplate::Face(encoding))
        }
        Modality::Fingerprint => {
            let template: FingerprintTemplate = decode(text)?;
            if template.points.is_empty() {
                return Err(EngineError::MalformedTemplate(
                    "fingerprint template has no minutiae".into(),
                ));
            }
            Ok(StoredTemplate::Fingerprint(template))
        }
    }
}
