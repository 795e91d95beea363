//! Dispatching commands for any state type.

use std::fmt;
use std::sync::Arc;

use eventweave_core::aggregate::Root;
use eventweave_core::command::Command;
use eventweave_core::commit::{CommitConfig, CommitOutcome};
use eventweave_core::error::DomainError;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::MetadataScope;
use eventweave_core::repository::Repository;
use eventweave_core::serializer::Serializer;
use eventweave_core::state::State;
use eventweave_core::store::EventStore;

use crate::pipeline::CommandPipeline;
use crate::routing::RoutingPolicy;

/// Sends commands through a freshly assembled pipeline.
///
/// Reactions, sagas and policies use the bus; each dispatched command gets
/// its own pipeline, repository and unit of work, nothing is reused across
/// messages.
#[derive(Clone)]
pub struct CommandBus {
    store: Arc<dyn EventStore>,
    serializer: Arc<dyn Serializer>,
    policy: RoutingPolicy,
    commit: CommitConfig,
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBus")
            .field("serializer", &self.serializer)
            .field("policy", &self.policy)
            .field("commit", &self.commit)
            .finish_non_exhaustive()
    }
}

impl CommandBus {
    /// Creates a bus.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        serializer: Arc<dyn Serializer>,
        policy: RoutingPolicy,
        commit: CommitConfig,
    ) -> Self {
        Self {
            store,
            serializer,
            policy,
            commit,
        }
    }

    /// The routing policy commands are dispatched with.
    #[must_use]
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Builds a pipeline for state `S`.
    #[must_use]
    pub fn pipeline<S: State>(&self) -> CommandPipeline<S> {
        CommandPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.serializer),
            self.policy,
            self.commit,
        )
    }

    /// Executes `command` against the aggregate `id` of state `S`.
    ///
    /// # Errors
    ///
    /// See [`CommandPipeline::execute`].
    pub async fn execute<S, C>(
        &self,
        id: &AggregateIdentifier,
        command: &C,
        metadata: &MetadataScope,
    ) -> Result<CommitOutcome, DomainError>
    where
        S: State,
        C: Command<S>,
    {
        self.pipeline::<S>().execute(id, command, metadata).await
    }

    /// Replays the aggregate `id` of state `S` outside any unit of work.
    ///
    /// # Errors
    ///
    /// See [`Repository::load`].
    pub async fn load<S: State>(&self, id: &AggregateIdentifier) -> Result<Option<Root<S>>, DomainError> {
        Repository::<S>::new(Arc::clone(&self.store), Arc::clone(&self.serializer))
            .load(id)
            .await
    }
}
