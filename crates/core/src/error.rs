//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// A single violated semantic rule, carrying a stable rule identifier so
/// clients can act on it programmatically (spec.md §7: "errors carry
/// structured detail — violated rule identifiers").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Stable identifier, e.g. `"AggregationAddRequiresParent"`.
    pub rule: &'static str,
    /// Human-readable detail (which event, which field).
    pub detail: String,
}

impl RuleViolation {
    pub fn new(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

impl core::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.rule, self.detail)
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns (storage, network) belong
/// to their own crate-local error enums (`epcis_storage::StorageError`,
/// etc.) per spec.md §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more semantic rules were violated (spec.md §4.2).
    #[error("validation failed: {} rule(s) violated", .0.len())]
    ValidationFailed(Vec<RuleViolation>),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate eventId within one capture).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation_failed(violations: Vec<RuleViolation>) -> Self {
        Self::ValidationFailed(violations)
    }

    pub fn single_violation(rule: &'static str, detail: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![RuleViolation::new(rule, detail)])
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// The rule violations carried by this error, if any.
    pub fn violations(&self) -> &[RuleViolation] {
        match self {
            DomainError::ValidationFailed(v) => v,
            _ => &[],
        }
    }
}
