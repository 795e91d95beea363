//! Domain error types.

use thiserror::Error;

use crate::identifier::{AggregateIdentifier, ExpectedVersion};

/// Failures reported by the stream store collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The stream was not at the expected version.
    #[error("wrong expected version on stream {stream}: expected {expected}, actual {actual:?}")]
    WrongExpectedVersion {
        /// The stream the append targeted.
        stream: AggregateIdentifier,
        /// The condition the caller sent.
        expected: ExpectedVersion,
        /// Position of the last event in the stream, if it exists.
        actual: Option<u64>,
    },

    /// The call did not complete before its deadline.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The store answered with an unknown status.
    #[error("unknown store status: {0}")]
    Unknown(String),

    /// The store or the subscription transport is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No persistent subscription with this group name exists.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// A persistent subscription with this group name already exists.
    #[error("subscription already exists: {0}")]
    SubscriptionExists(String),

    /// Any other store failure.
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns `true` for failures the commit protocol may retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_) | Self::Unknown(_))
    }
}

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found where modification required it.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateIdentifier),

    /// Reading a reserved system stream is a programming error.
    #[error("attempted to load system stream {0} as an aggregate")]
    SystemStream(AggregateIdentifier),

    /// The same identifier was attached twice to one unit of work.
    #[error("aggregate {0} is already attached to the unit of work")]
    DuplicateAttach(AggregateIdentifier),

    /// More than one aggregate changed while handling a single command.
    #[error("unsupported operation: {} aggregates changed in one unit of work ({})", .0.len(), join(.0))]
    MultipleChangedAggregates(Vec<AggregateIdentifier>),

    /// An attached root was requested with a different state type.
    #[error("aggregate {0} is attached with a different state type")]
    RootTypeMismatch(AggregateIdentifier),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {stream}: expected version {expected}, found {actual:?}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        stream: AggregateIdentifier,
        /// The expected version.
        expected: ExpectedVersion,
        /// The actual position found.
        actual: Option<u64>,
    },

    /// No decoder is registered for a wire event type.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A payload or metadata document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WrongExpectedVersion {
                stream,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                stream,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn join(ids: &[AggregateIdentifier]) -> String {
    ids.iter()
        .map(AggregateIdentifier::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
