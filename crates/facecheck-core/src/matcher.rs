//! Face match decision procedure.
//!
//! A linear scan over every stored profile, scoring each comparable one
//! with absolute cosine similarity, followed by a two-threshold decision:
//! accept, low confidence (retryable), or not found.

use crate::types::{FaceProfile, FeatureVector, MatchCandidate, MatchResult, Thresholds};
use thiserror::Error;

/// Minimum externally-reported face quality before matching is attempted.
pub const QUALITY_MIN: f32 = 0.3;

/// Coarse classification of every recoverable check-in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    LowQuality,
    LowConfidence,
    NotFound,
    DecodeError,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("face quality too low: {quality:.2} (minimum: {minimum})")]
    LowQuality { quality: f32, minimum: f32 },
    #[error("poor recognition: confidence {score:.3} below acceptance threshold {threshold}")]
    LowConfidence {
        employee_id: String,
        score: f32,
        threshold: f32,
    },
    #[error("no matching face profile (best score {best_score:.3})")]
    NotFound { best_score: f32 },
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::InvalidInput(_) => ErrorKind::InvalidInput,
            MatchError::LowQuality { .. } => ErrorKind::LowQuality,
            MatchError::LowConfidence { .. } => ErrorKind::LowConfidence,
            MatchError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Strategy for comparing a query vector against a gallery of stored profiles.
pub trait Matcher {
    /// Score every comparable profile, best first.
    ///
    /// Profiles whose dimensionality differs from the query are left out.
    fn rank(
        &self,
        query: &FeatureVector,
        gallery: &[FaceProfile],
    ) -> Result<Vec<MatchCandidate>, MatchError>;

    /// Rank the gallery and apply the decision policy.
    fn compare(
        &self,
        query: &FeatureVector,
        gallery: &[FaceProfile],
        thresholds: &Thresholds,
    ) -> Result<MatchResult, MatchError> {
        let ranked = self.rank(query, gallery)?;
        decide(ranked, thresholds)
    }
}

/// Absolute-cosine matcher. Always scans the full gallery.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn rank(
        &self,
        query: &FeatureVector,
        gallery: &[FaceProfile],
    ) -> Result<Vec<MatchCandidate>, MatchError> {
        if query.is_empty() {
            return Err(MatchError::InvalidInput(
                "query feature vector is empty".into(),
            ));
        }

        let mut ranked: Vec<MatchCandidate> = gallery
            .iter()
            .filter_map(|profile| match query.similarity(&profile.vector) {
                Some(similarity) => {
                    tracing::debug!(
                        employee_id = %profile.employee_id,
                        similarity,
                        "scored candidate"
                    );
                    Some(MatchCandidate {
                        employee_id: profile.employee_id.clone(),
                        similarity,
                    })
                }
                None => {
                    tracing::debug!(
                        employee_id = %profile.employee_id,
                        stored = profile.vector.len(),
                        query = query.len(),
                        "dimension mismatch; candidate not comparable"
                    );
                    None
                }
            })
            .collect();

        // Equal scores fall back to the lowest employee id.
        ranked.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });

        Ok(ranked)
    }
}

/// Apply the decision policy to a list ranked best first.
pub fn decide(
    ranked: Vec<MatchCandidate>,
    thresholds: &Thresholds,
) -> Result<MatchResult, MatchError> {
    let Some(best) = ranked.first() else {
        return Err(MatchError::NotFound { best_score: 0.0 });
    };
    let employee_id = best.employee_id.clone();
    let score = best.similarity;

    if score >= thresholds.accept {
        Ok(MatchResult {
            employee_id,
            similarity: score,
            threshold: thresholds.accept,
            ranked,
        })
    } else if score >= thresholds.low_confidence {
        Err(MatchError::LowConfidence {
            employee_id,
            score,
            threshold: thresholds.accept,
        })
    } else {
        Err(MatchError::NotFound { best_score: score })
    }
}

/// Fail fast on a poor capture before any matching happens.
///
/// A non-finite quality never passes.
pub fn quality_gate(quality: f32, minimum: f32) -> Result<(), MatchError> {
    if quality.is_finite() && quality >= minimum {
        Ok(())
    } else {
        Err(MatchError::LowQuality { quality, minimum })
    }
}
