//! Stored face-encoding codec.
//!
//! The recognition service hands out encodings as base64 of a compact JSON
//! document. The store keeps the decoded JSON bytes; the feature list is
//! read from `features`, falling back to `face_features`.

use crate::matcher::ErrorKind;
use crate::types::FeatureVector;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENCODING_TYPE: &str = "enhanced_features";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("encoding is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("encoding is not a JSON feature document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoding has neither `features` nor `face_features`")]
    MissingFeatures,
    #[error("encoding carries an empty feature list")]
    Empty,
    #[error("encoding feature #{index} is not finite")]
    NonFinite { index: usize },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DecodeError
    }
}

/// JSON document carried inside a stored encoding.
///
/// Every field is optional on read so that encodings produced by older
/// service versions still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_features: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,
}

impl EncodingDocument {
    /// Build a document for one employee's features.
    pub fn from_features(employee_id: impl Into<String>, features: Vec<f32>) -> Self {
        Self {
            employee_id: Some(employee_id.into()),
            feature_count: Some(features.len()),
            features: Some(features),
            encoding_type: Some(ENCODING_TYPE.to_string()),
            ..Self::default()
        }
    }

    /// Serialize to the stored (JSON byte) form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse the stored form without validating the feature list.
    pub fn from_bytes(stored: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(stored)?)
    }

    /// Extract a comparable feature vector.
    pub fn feature_vector(&self) -> Result<FeatureVector, DecodeError> {
        let features = self
            .features
            .as_ref()
            .or(self.face_features.as_ref())
            .ok_or(DecodeError::MissingFeatures)?;

        if features.is_empty() {
            return Err(DecodeError::Empty);
        }
        if let Some(index) = features.iter().position(|v| !v.is_finite()) {
            return Err(DecodeError::NonFinite { index });
        }

        Ok(FeatureVector::new(features.clone()))
    }
}

/// Decode a stored encoding into a feature vector.
pub fn decode_profile(stored: &[u8]) -> Result<FeatureVector, DecodeError> {
    EncodingDocument::from_bytes(stored)?.feature_vector()
}

/// Wire (base64) form to stored form.
pub fn from_base64(wire: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(wire.trim())?)
}

/// Stored form to wire (base64) form.
pub fn to_base64(stored: &[u8]) -> String {
    STANDARD.encode(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_service_document() {
        let json = br#"{"employee_id":"e1","employee_name":"Lan","quality":0.82,"frame_count":12,"features":[0.5,-0.25,1.0],"feature_count":3,"timestamp":"2025-08-17T06:53:41Z","encoding_type":"enhanced_features"}"#;
        let v = decode_profile(json).unwrap();
        assert_eq!(v.values, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn test_decode_falls_back_to_face_features() {
        let v = decode_profile(br#"{"face_features":[1.0,2.0]}"#).unwrap();
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_decode_prefers_features_over_face_features() {
        let v = decode_profile(br#"{"features":[3.0],"face_features":[1.0,2.0]}"#).unwrap();
        assert_eq!(v.values, vec![3.0]);
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode_profile(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode_profile(br#"{"quality":0.9}"#),
            Err(DecodeError::MissingFeatures)
        ));
        assert!(matches!(
            decode_profile(br#"{"features":[]}"#),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            decode_profile(br#"{"features":["a"]}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_non_finite_feature_rejected() {
        let doc = EncodingDocument {
            features: Some(vec![1.0, f32::INFINITY]),
            ..Default::default()
        };
        assert!(matches!(
            doc.feature_vector(),
            Err(DecodeError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn test_wire_form_matches_service_output() {
        // base64 of {"features":[1.0,0.0]}
        let stored = from_base64("eyJmZWF0dXJlcyI6WzEuMCwwLjBdfQ==").unwrap();
        assert_eq!(stored, br#"{"features":[1.0,0.0]}"#);
        assert_eq!(decode_profile(&stored).unwrap().values, vec![1.0, 0.0]);
        assert!(matches!(from_base64("%%%"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_document_from_features() {
        let doc = EncodingDocument::from_features("e7", vec![0.1, 0.2]);
        let stored = doc.to_bytes().unwrap();
        let parsed = EncodingDocument::from_bytes(&stored).unwrap();
        assert_eq!(parsed.employee_id.as_deref(), Some("e7"));
        assert_eq!(parsed.feature_count, Some(2));
        assert_eq!(parsed.encoding_type.as_deref(), Some("enhanced_features"));
        assert_eq!(from_base64(&to_base64(&stored)).unwrap(), stored);
    }
}
