//! Storage-layer error model.
//!
//! Kept separate from `epcis_core::DomainError` (spec.md §7): storage
//! failures are infrastructure failures (connection, constraint, encoding),
//! not business-rule violations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage provider '{0}' is not implemented")]
    UnsupportedProvider(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("internal storage error: {0}")]
    Internal(String),
}
