//! Query-engine error model (parameter parsing, result caps, storage).

use epcis_storage::StorageError;
use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unsupported query parameter: {0}")]
    UnsupportedParameter(String),

    #[error("invalid value for parameter {name}: {detail}")]
    InvalidParameterValue { name: String, detail: String },

    #[error("result would be truncated by eventCountLimit={limit}, matched at least {matched}")]
    QueryTooLargeException { limit: u32, matched: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("query canceled")]
    Canceled,

    #[error("subscription '{0}' already exists for this tenant")]
    SubscriptionAlreadyExists(String),
}
