//! Subscription worker error types.

use thiserror::Error;

use eventweave_core::error::StoreError;

/// Failures that end a subscription worker.
///
/// Transport failures while processing never surface here; the worker
/// reconnects instead.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The consumer does not register any contract-declared event type.
    #[error("subscription {0} consumes no contract-declared event types")]
    NoContracts(String),

    /// Listing, creating or deleting subscriptions failed during bootstrap.
    #[error("bootstrap of subscription {group} failed: {source}")]
    Bootstrap {
        /// The group being bootstrapped.
        group: String,
        /// The store failure.
        #[source]
        source: StoreError,
    },

    /// The worker task panicked or was aborted.
    #[error("subscription task failed: {0}")]
    TaskFailed(String),
}
