use std::time::Duration;

use facecheck_core::{DecodeError, MatchError};
use thiserror::Error;

use crate::recognition::RecognitionError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("stored face encoding is unusable: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("employee {0} has incomplete data: no email on record")]
    IncompleteEmployee(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("check-in did not complete within {0:?}")]
    Timeout(Duration),
}
