//! Test doubles shared by the service and HTTP tests.

use std::time::Duration;

use facecheck_core::{encoding, EncodingDocument};

use crate::error::ServiceError;
use crate::recognition::{ExtractedFace, FeatureExtractor, RecognitionError, RegisteredEncoding};

/// Wire-form encoding of `features`, as the recognition service would hand out.
pub fn encode_features(employee_id: &str, features: Vec<f32>) -> Result<String, ServiceError> {
    let stored = EncodingDocument::from_features(employee_id, features).to_bytes()?;
    Ok(encoding::to_base64(&stored))
}

/// Extractor that reports the same face for every image.
pub struct FakeExtractor {
    pub face: ExtractedFace,
    pub delay: Duration,
}

impl FakeExtractor {
    pub fn new(quality: f32, features: &[f32]) -> Self {
        Self {
            face: ExtractedFace {
                faces_count: 1,
                face_quality: quality,
                face_features: features.to_vec(),
            },
            delay: Duration::ZERO,
        }
    }
}

impl FeatureExtractor for FakeExtractor {
    async fn extract(&self, _image: &str) -> Result<ExtractedFace, RecognitionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.face.clone())
    }

    async fn register(
        &self,
        employee_id: &str,
        _employee_name: &str,
        _frames: &[String],
    ) -> Result<RegisteredEncoding, RecognitionError> {
        let encoding = encode_features(employee_id, self.face.face_features.clone())
            .map_err(|e| RecognitionError::Rejected(e.to_string()))?;
        Ok(RegisteredEncoding {
            encoding,
            processing_result: serde_json::json!({"success": true}),
        })
    }
}
