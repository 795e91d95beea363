//! Process configuration read from the environment.

use std::time::Duration;

use eventweave_commands::RoutingPolicy;
use eventweave_core::commit::CommitConfig;

use crate::error::AppError;

/// Selects the command routing policy (`automatic` or `marker`).
pub const ROUTING_VAR: &str = "EVENTWEAVE_ROUTING";
/// Base commit retry backoff in milliseconds.
pub const COMMIT_BACKOFF_VAR: &str = "EVENTWEAVE_COMMIT_BACKOFF_MS";
/// Total commit attempts, including the first.
pub const COMMIT_MAX_ATTEMPTS_VAR: &str = "EVENTWEAVE_COMMIT_MAX_ATTEMPTS";
/// `PostgreSQL` URL; enables the SQL projection when set.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Demo process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Process-wide routing policy.
    pub routing: RoutingPolicy,
    /// Commit retry tuning.
    pub commit: CommitConfig,
    /// Database for the SQL projection, if any.
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`; unset variables use defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let routing = match lookup(ROUTING_VAR) {
            Some(value) => value
                .parse()
                .map_err(|e| AppError::Config(format!("{ROUTING_VAR}: {e}")))?,
            None => RoutingPolicy::default(),
        };

        let defaults = CommitConfig::default();
        let backoff = match lookup(COMMIT_BACKOFF_VAR) {
            Some(value) => Duration::from_millis(value.parse().map_err(|e| {
                AppError::Config(format!("{COMMIT_BACKOFF_VAR} must be milliseconds: {e}"))
            })?),
            None => defaults.backoff,
        };
        let max_attempts = match lookup(COMMIT_MAX_ATTEMPTS_VAR) {
            Some(value) => value.parse().map_err(|e| {
                AppError::Config(format!("{COMMIT_MAX_ATTEMPTS_VAR} must be a positive integer: {e}"))
            })?,
            None => defaults.max_attempts,
        };
        if max_attempts == 0 {
            return Err(AppError::Config(format!(
                "{COMMIT_MAX_ATTEMPTS_VAR} must be at least 1"
            )));
        }

        Ok(Self {
            routing,
            commit: CommitConfig {
                max_attempts,
                backoff,
            },
            database_url: lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty()),
        })
    }
}
