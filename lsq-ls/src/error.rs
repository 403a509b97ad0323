//! Error types for lsq-ls
//!
//! Module-specific error types using thiserror. The variants map directly
//! onto the HTTP statuses ingest callers see: validation → 400, missing
//! profile → 404, lock timeout → 503 (retryable), persistence → 500.
//! Duplicate event delivery is NOT an error; it returns success with
//! `duplicate: true`.

use thiserror::Error;

/// Main error type for the lead scoring service
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed required field in a raw event
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested profile or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Per-lead lock could not be acquired within the bounded timeout.
    /// Retry-safe: the event_id idempotency contract makes resends harmless.
    #[error("Lock timeout for identity key: {0}")]
    LockTimeout(String),

    /// Database connection or query errors; apply_event rolls back atomically
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<lsq_common::Error> for Error {
    fn from(e: lsq_common::Error) -> Self {
        match e {
            lsq_common::Error::Database(e) => Error::Database(e),
            lsq_common::Error::NotFound(s) => Error::NotFound(s),
            lsq_common::Error::InvalidInput(s) => Error::Validation(s),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// Convenience Result type using lsq-ls Error
pub type Result<T> = std::result::Result<T, Error>;
