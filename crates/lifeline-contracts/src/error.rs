//! Error types for the LIFELINE alert pipeline.
//!
//! All fallible operations return `LifelineResult<T>`. Variants carry enough
//! context for the command surface to tell a counselor exactly what happened
//! (for example "already claimed by another counselor") and for the audit
//! logger to record the failure.

use thiserror::Error;

/// The unified error type for the LIFELINE workspace.
#[derive(Debug, Error)]
pub enum LifelineError {
    /// Malformed input: missing fields, out-of-range values, schema violations.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The referenced record does not exist.
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    /// The caller's role or ownership does not permit the operation.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    /// An optimistic-concurrency check failed: the record changed since it was read.
    ///
    /// `holder` names the counselor currently handling the alert, when known.
    #[error("conflict on {resource} '{id}': {reason}")]
    Conflict {
        resource: String,
        id: String,
        reason: String,
        holder: Option<String>,
    },

    /// The requested status change is not in the alert state table.
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// The submitting user exceeded the per-minute submission limit.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { user_id: String, retry_after_secs: u64 },

    /// A real-time delivery could not reach a presence. Non-fatal.
    #[error("delivery to connection '{connection_id}' failed: {reason}")]
    Delivery { connection_id: String, reason: String },

    /// The audit trail could not be written.
    ///
    /// Never allowed to block the primary operation; surfaced to operators.
    #[error("audit failure: {reason}")]
    AuditFailure { reason: String },

    /// The backing store failed (for example a poisoned lock).
    #[error("storage failure in {component}: {reason}")]
    Storage { component: String, reason: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The encryption capability failed to seal or open a payload.
    #[error("crypto error: {reason}")]
    Crypto { reason: String },
}

impl LifelineError {
    /// Shorthand for a `NotFound` on a safety alert.
    pub fn alert_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            resource: "alert".to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a poisoned-lock `Storage` error.
    pub fn lock_poisoned(component: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            component: component.to_string(),
            reason: format!("lock poisoned: {}", err),
        }
    }

    /// Shorthand for a `Forbidden` error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the LIFELINE crates.
pub type LifelineResult<T> = Result<T, LifelineError>;
