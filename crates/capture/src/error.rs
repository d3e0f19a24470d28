//! Capture-handler error model.

use epcis_core::{DomainError, RuleViolation};
use epcis_storage::StorageError;
use thiserror::Error;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture submitted {submitted} events, limit is {limit}")]
    CaptureLimitExceeded { submitted: usize, limit: usize },

    #[error("validation failed: {} rule(s) violated", .0.len())]
    ValidationFailed(Vec<RuleViolation>),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("capture canceled")]
    Canceled,
}

impl CaptureError {
    pub fn violations(&self) -> &[RuleViolation] {
        match self {
            CaptureError::ValidationFailed(v) => v,
            _ => &[],
        }
    }
}

impl From<DomainError> for CaptureError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::ValidationFailed(violations) => CaptureError::ValidationFailed(violations),
            other => CaptureError::ValidationFailed(vec![RuleViolation::new("DomainError", other.to_string())]),
        }
    }
}
