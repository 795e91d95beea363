//! Commit protocol.
//!
//! A [`CommitScope`] wraps one command execution. The handler marks it
//! complete on success; closing the scope commits a completed unit of work
//! and always clears it, whatever happened before.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::EventData;
use crate::identifier::{AggregateIdentifier, AggregateVersion, ExpectedVersion};
use crate::metadata::MetadataScope;
use crate::serializer::Serializer;
use crate::store::{AppendResult, EventStore};
use crate::unit_of_work::UnitOfWork;

/// Default number of append attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay between append attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Retry settings for appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitConfig {
    /// Total number of append attempts, including the first.
    pub max_attempts: u32,
    /// Base delay; the delay after attempt `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What a commit wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// No attached aggregate had pending changes.
    NoChanges,
    /// Events were appended to one stream.
    Committed {
        /// The stream written to.
        stream: AggregateIdentifier,
        /// Identifiers of the appended events, in order.
        event_ids: Vec<Uuid>,
        /// Version of the aggregate after the append.
        version: AggregateVersion,
    },
}

/// Writes the changed aggregate of a unit of work to the store.
#[derive(Clone)]
pub struct Committer {
    store: Arc<dyn EventStore>,
    serializer: Arc<dyn Serializer>,
    config: CommitConfig,
}

impl std::fmt::Debug for Committer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Committer")
            .field("serializer", &self.serializer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Committer {
    /// Creates a committer.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, serializer: Arc<dyn Serializer>, config: CommitConfig) -> Self {
        Self {
            store,
            serializer,
            config,
        }
    }

    /// The retry settings in use.
    #[must_use]
    pub fn config(&self) -> CommitConfig {
        self.config
    }

    /// Appends the pending changes of the single changed aggregate.
    ///
    /// Pending events get deterministic identifiers, so a retried append
    /// carries the same identities as the attempt that may have landed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MultipleChangedAggregates` if more than one
    /// aggregate changed, `DomainError::ConcurrencyConflict` on a version
    /// mismatch (never retried) and `DomainError::Store` once transient
    /// failures exhaust the attempts or on any other store failure.
    pub async fn commit(
        &self,
        uow: &mut UnitOfWork,
        metadata: &MetadataScope,
    ) -> Result<CommitOutcome, DomainError> {
        let Some(changed) = uow.changed()? else {
            debug!("nothing to commit");
            return Ok(CommitOutcome::NoChanges);
        };

        let stream = changed.id.clone();
        let version = changed.root.version();
        let events = changed
            .root
            .encode_changes(&stream, metadata, self.serializer.as_ref())?;
        let event_ids: Vec<Uuid> = events.iter().map(|event| event.event_id).collect();
        let count = events.len();

        let result = self.append(&stream, version.expected(), events).await?;
        uow.mark_committed(&stream);

        let version = version.advance(count);
        info!(
            aggregate = %stream,
            events = count,
            version = %version,
            log_position = result.log_position,
            "committed"
        );
        Ok(CommitOutcome::Committed {
            stream,
            event_ids,
            version,
        })
    }

    async fn append(
        &self,
        stream: &AggregateIdentifier,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, DomainError> {
        let mut attempt: u32 = 1;
        loop {
            match self.store.append(stream, expected, events.clone()).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff * attempt;
                    warn!(
                        aggregate = %stream,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient append failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(aggregate = %stream, attempt, error = %err, "append failed");
                    return Err(err.into());
                }
            }
        }
    }
}

/// Scoped acquisition of a unit of work for one command execution.
///
/// The unit of work is cleared when the scope is closed or dropped, so an
/// early return or a rejected command never leaks attached roots into the
/// next execution.
#[derive(Debug)]
pub struct CommitScope<'a> {
    uow: &'a mut UnitOfWork,
    committer: &'a Committer,
    complete: bool,
}

impl<'a> CommitScope<'a> {
    /// Opens a scope over `uow`.
    #[must_use]
    pub fn open(uow: &'a mut UnitOfWork, committer: &'a Committer) -> Self {
        Self {
            uow,
            committer,
            complete: false,
        }
    }

    /// The unit of work the handler attaches roots to.
    pub fn unit_of_work(&mut self) -> &mut UnitOfWork {
        self.uow
    }

    /// Marks the execution as successful.
    pub fn complete(&mut self) {
        self.complete = true;
    }

    /// Returns `true` once [`CommitScope::complete`] was called.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Ends the scope, committing if it was completed.
    ///
    /// # Errors
    ///
    /// See [`Committer::commit`]. The unit of work is cleared either way.
    pub async fn close(self, metadata: &MetadataScope) -> Result<CommitOutcome, DomainError> {
        if !self.complete {
            debug!("scope closed without completion, discarding unit of work");
            return Ok(CommitOutcome::NoChanges);
        }
        self.committer.commit(self.uow, metadata).await
    }
}

impl Drop for CommitScope<'_> {
    fn drop(&mut self) {
        self.uow.clear();
    }
}
