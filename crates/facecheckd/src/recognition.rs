//! Client for the external face recognition service.
//!
//! The service detects faces, scores capture quality and extracts the
//! feature vector; this daemon only consumes its answers.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognition service unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    #[error("recognition service rejected the request: {0}")]
    Rejected(String),
}

/// What the service reports for one check-in image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedFace {
    pub faces_count: u32,
    pub face_quality: f32,
    pub face_features: Vec<f32>,
}

/// Encoding produced by a registration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredEncoding {
    /// Base64 wire form.
    pub encoding: String,
    /// Full service response, echoed back to the caller.
    pub processing_result: Value,
}

/// Source of face features. Implemented over HTTP by [`RecognitionClient`].
pub trait FeatureExtractor: Send + Sync {
    /// Detect the face in a base64 image and extract its features.
    fn extract(
        &self,
        image: &str,
    ) -> impl Future<Output = Result<ExtractedFace, RecognitionError>> + Send;

    /// Build an encoding for an employee from a burst of captured frames.
    fn register(
        &self,
        employee_id: &str,
        employee_name: &str,
        frames: &[String],
    ) -> impl Future<Output = Result<RegisteredEncoding, RecognitionError>> + Send;
}

#[derive(Debug, Deserialize)]
struct CheckinResponse {
    success: bool,
    #[serde(default)]
    faces_count: u32,
    #[serde(default)]
    face_quality: f32,
    #[serde(default)]
    face_features: Vec<f32>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CheckinResponse {
    fn into_face(self) -> Result<ExtractedFace, RecognitionError> {
        if !self.success {
            return Err(RecognitionError::Rejected(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| "face processing failed".into()),
            ));
        }
        Ok(ExtractedFace {
            faces_count: self.faces_count,
            face_quality: self.face_quality,
            face_features: self.face_features,
        })
    }
}

fn registration_from(body: Value) -> Result<RegisteredEncoding, RecognitionError> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    let encoding = body
        .get("encoding")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    match (success, encoding) {
        (true, Some(encoding)) => Ok(RegisteredEncoding {
            encoding,
            processing_result: body,
        }),
        (true, None) => Err(RecognitionError::Rejected(
            "registration succeeded without an encoding".into(),
        )),
        (false, _) => {
            let reason = ["error", "message"]
                .iter()
                .find_map(|k| body.get(*k).and_then(Value::as_str))
                .unwrap_or("face processing failed");
            Err(RecognitionError::Rejected(reason.to_string()))
        }
    }
}

/// HTTP client for the recognition service.
#[derive(Clone)]
pub struct RecognitionClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecognitionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RecognitionError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl FeatureExtractor for RecognitionClient {
    async fn extract(&self, image: &str) -> Result<ExtractedFace, RecognitionError> {
        let url = self.endpoint("/process/checkin");
        tracing::debug!(%url, image_len = image.len(), "requesting face features");

        // Rejections come back as 4xx with a JSON body, so the body is read
        // regardless of status.
        let response: CheckinResponse = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "image": image }))
            .send()
            .await?
            .json()
            .await?;

        response.into_face()
    }

    async fn register(
        &self,
        employee_id: &str,
        employee_name: &str,
        frames: &[String],
    ) -> Result<RegisteredEncoding, RecognitionError> {
        let url = self.endpoint("/process/register");
        tracing::debug!(%url, employee_id, frames = frames.len(), "requesting face registration");

        let body: Value = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "employee_id": employee_id,
                "employee_name": employee_name,
                "video_frames": frames,
            }))
            .send()
            .await?
            .json()
            .await?;

        registration_from(body)
    }
}
