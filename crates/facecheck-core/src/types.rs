use serde::{Deserialize, Serialize};

/// Face feature vector as produced by the external feature extractor.
///
/// Dimensionality is whatever the extractor emits; two vectors are only
/// comparable when their lengths agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Similarity against another vector, in [0, 1].
    ///
    /// Uses the absolute value of the cosine so that sign-flipped
    /// representations of the same face still score high. Returns `None`
    /// when the two vectors differ in length: such a pair is not
    /// comparable and must not be ranked at all.
    pub fn similarity(&self, other: &FeatureVector) -> Option<f32> {
        let raw = abs_cosine(&self.values, &other.values)?;
        if raw.is_finite() {
            Some(raw.clamp(0.0, 1.0) as f32)
        } else {
            Some(0.0)
        }
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Unclamped `|dot(a, b)| / (||a|| * ||b||)`.
///
/// Accumulates in f64. A zero-norm operand yields 0. `None` on length
/// mismatch.
pub fn abs_cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    Some(if denom > 0.0 { dot.abs() / denom } else { 0.0 })
}

/// The single stored encoding of one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceProfile {
    pub employee_id: String,
    pub vector: FeatureVector,
}

impl FaceProfile {
    pub fn new(employee_id: impl Into<String>, vector: impl Into<FeatureVector>) -> Self {
        Self {
            employee_id: employee_id.into(),
            vector: vector.into(),
        }
    }
}

/// One scored comparison, computed transiently during a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub employee_id: String,
    pub similarity: f32,
}

/// An accepted match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub employee_id: String,
    /// Similarity of the accepted candidate, in [0, 1].
    pub similarity: f32,
    /// Acceptance threshold the score was held against.
    pub threshold: f32,
    /// Every comparable candidate, best first. Diagnostic only.
    pub ranked: Vec<MatchCandidate>,
}

/// Score boundaries of the decision policy.
///
/// `score >= accept` accepts, `low_confidence <= score < accept` is a
/// retryable low-confidence failure, anything lower is "not found".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub accept: f32,
    pub low_confidence: f32,
}

impl Thresholds {
    pub const DEFAULT_ACCEPT: f32 = 0.5;
    pub const DEFAULT_LOW_CONFIDENCE: f32 = 0.3;

    /// Build a threshold pair, rejecting values outside
    /// `0 <= low_confidence <= accept <= 1`.
    pub fn new(accept: f32, low_confidence: f32) -> Result<Self, crate::MatchError> {
        let ordered = (0.0..=1.0).contains(&low_confidence)
            && (0.0..=1.0).contains(&accept)
            && low_confidence <= accept;
        if !ordered {
            return Err(crate::MatchError::InvalidInput(format!(
                "thresholds must satisfy 0 <= low_confidence ({low_confidence}) <= accept ({accept}) <= 1"
            )));
        }
        Ok(Self {
            accept,
            low_confidence,
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accept: Self::DEFAULT_ACCEPT,
            low_confidence: Self::DEFAULT_LOW_CONFIDENCE,
        }
    }
}
