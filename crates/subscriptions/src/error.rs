//! Subscription-engine error model.

use epcis_query::QueryError;
use epcis_storage::StorageError;
use thiserror::Error;

pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription '{0}' already exists for this tenant")]
    AlreadyExists(String),

    #[error("no subscription named '{0}' for this tenant")]
    NotFound(String),

    #[error("invalid cron expression '{expression}': {detail}")]
    InvalidSchedule { expression: String, detail: String },

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("subscription canceled")]
    Canceled,
}
