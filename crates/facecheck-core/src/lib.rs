//! facecheck-core: face match decision procedure.
//!
//! Scores a query feature vector against stored employee profiles with
//! absolute cosine similarity and decides accept / low confidence /
//! not found. Also decodes the recognition service's stored encodings.

pub mod encoding;
pub mod matcher;
pub mod types;

pub use encoding::{decode_profile, DecodeError, EncodingDocument};
pub use matcher::{decide, quality_gate, CosineMatcher, ErrorKind, MatchError, Matcher, QUALITY_MIN};
pub use types::{FaceProfile, FeatureVector, MatchCandidate, MatchResult, Thresholds};
