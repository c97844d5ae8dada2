//! Error types for harvestq.
//!
//! Store-level failures are folded into a small taxonomy so callers can
//! tell "retry the same call" (`StoreUnavailable`, `StoreConflict`) apart
//! from "the request itself is wrong" (`ConstraintViolation`, `NotFound`).
//! This layer never retries; retry policy belongs to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Insert violated a uniqueness or reference constraint
    /// (duplicate source, unknown site).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The store could not be reached or a connection was lost.
    /// State is unchanged; the same call may be retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transactional serialization failure inside the store.
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// A point operation matched zero rows where exactly one was expected.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store handed back a state string outside the closed enum.
    #[error("invalid state in store: {0:?}")]
    InvalidState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation, foreign_key_violation, not_null_violation
                // (the last covers "unknown site" subselects resolving to NULL)
                Some("23505") | Some("23503") | Some("23502") => {
                    Error::ConstraintViolation(db.message().to_string())
                }
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => Error::StoreConflict(db.message().to_string()),
                _ => Error::Other(err.to_string()),
            },
            _ => Error::Other(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
