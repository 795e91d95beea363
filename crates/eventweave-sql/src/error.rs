//! SQL projection error types.

use thiserror::Error;

use eventweave_core::error::{DomainError, StoreError};

/// Failures preparing or running a SQL batch.
#[derive(Debug, Error)]
pub enum SqlProjectionError {
    /// A statement references a named parameter that was never bound.
    #[error("parameter @{name} is not bound in: {sql}")]
    UnboundParameter {
        /// The missing parameter name, without `@`.
        name: String,
        /// The statement text.
        sql: String,
    },

    /// A parameter was bound under a name that cannot appear in SQL.
    #[error("invalid parameter name: {0:?}")]
    InvalidParameterName(String),

    /// The database rejected a statement or the transaction.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SqlProjectionError> for DomainError {
    fn from(err: SqlProjectionError) -> Self {
        match err {
            SqlProjectionError::Database(sqlx::Error::PoolTimedOut) => {
                Self::Store(StoreError::DeadlineExceeded(err.to_string()))
            }
            SqlProjectionError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed,
            ) => Self::Store(StoreError::Unavailable(err.to_string())),
            SqlProjectionError::Database(_) => Self::Store(StoreError::Other(err.to_string())),
            SqlProjectionError::UnboundParameter { .. }
            | SqlProjectionError::InvalidParameterName(_) => Self::Validation(err.to_string()),
        }
    }
}
