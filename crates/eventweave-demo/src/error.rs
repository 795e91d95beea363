//! Eventweave Demo — error types.

use thiserror::Error;

use eventweave_core::error::DomainError;
use eventweave_sql::SqlProjectionError;
use eventweave_subscriptions::SubscriptionError;

/// Startup and runtime errors for the demo process.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Preparing the SQL projection schema failed.
    #[error("projection schema error: {0}")]
    Projection(#[from] SqlProjectionError),

    /// A command was rejected or could not be committed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A subscription worker ended with an error.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Signal handling or other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
