//! Pipeline layers wrapped around the router.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, info_span};

use eventweave_core::command::Command;
use eventweave_core::commit::{CommitConfig, CommitOutcome, CommitScope, Committer};
use eventweave_core::error::DomainError;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::{COMMAND_KEY, MetadataScope, Multiplicity};
use eventweave_core::repository::Repository;
use eventweave_core::serializer::Serializer;
use eventweave_core::state::State;
use eventweave_core::store::EventStore;
use eventweave_core::unit_of_work::UnitOfWork;

use crate::routing::{Router, RoutingPolicy};

/// Opens a commit scope around the router and commits on success.
pub struct UnitOfWorkHandler<S: State> {
    router: Router<S>,
    committer: Committer,
}

impl<S: State> fmt::Debug for UnitOfWorkHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkHandler")
            .field("router", &self.router)
            .field("committer", &self.committer)
            .finish()
    }
}

impl<S: State> UnitOfWorkHandler<S> {
    /// Wraps a router.
    #[must_use]
    pub fn new(router: Router<S>, committer: Committer) -> Self {
        Self { router, committer }
    }

    /// Routes the command inside a fresh unit of work, then commits.
    ///
    /// # Errors
    ///
    /// Returns routing and command failures without writing anything, and
    /// commit failures as described on [`Committer::commit`].
    pub async fn handle<C>(
        &self,
        id: &AggregateIdentifier,
        command: &C,
        metadata: &MetadataScope,
    ) -> Result<CommitOutcome, DomainError>
    where
        C: Command<S>,
    {
        let mut uow = UnitOfWork::new();
        let mut scope = CommitScope::open(&mut uow, &self.committer);
        self.router
            .route(scope.unit_of_work(), id, command)
            .await?;
        scope.complete();
        scope.close(metadata).await
    }
}

/// Outermost layer: runs the command under a child metadata scope.
#[derive(Debug)]
pub struct MetadataHandler<S: State> {
    inner: UnitOfWorkHandler<S>,
}

impl<S: State> MetadataHandler<S> {
    /// Wraps a unit-of-work handler.
    #[must_use]
    pub fn new(inner: UnitOfWorkHandler<S>) -> Self {
        Self { inner }
    }

    /// Seeds a child of `parent` with the command type and the command's own
    /// metadata, then delegates.
    ///
    /// # Errors
    ///
    /// See [`UnitOfWorkHandler::handle`].
    pub async fn handle<C>(
        &self,
        id: &AggregateIdentifier,
        command: &C,
        parent: &MetadataScope,
    ) -> Result<CommitOutcome, DomainError>
    where
        C: Command<S>,
    {
        let mut metadata = parent.child();
        metadata.add(COMMAND_KEY, command.command_type(), Multiplicity::Single);
        command.seed_metadata(&mut metadata);
        self.inner.handle(id, command, &metadata).await
    }
}

/// The assembled pipeline for one state type.
#[derive(Debug)]
pub struct CommandPipeline<S: State> {
    handler: MetadataHandler<S>,
}

impl<S: State> CommandPipeline<S> {
    /// Assembles metadata layer, unit-of-work layer and router.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        serializer: Arc<dyn Serializer>,
        policy: RoutingPolicy,
        commit: CommitConfig,
    ) -> Self {
        let repository = Repository::new(Arc::clone(&store), Arc::clone(&serializer));
        let committer = Committer::new(store, serializer, commit);
        Self::from_parts(Router::new(repository, policy), committer)
    }

    /// Assembles the pipeline around an existing router.
    #[must_use]
    pub fn from_parts(router: Router<S>, committer: Committer) -> Self {
        Self {
            handler: MetadataHandler::new(UnitOfWorkHandler::new(router, committer)),
        }
    }

    /// Executes one command against the aggregate named `id`.
    ///
    /// # Errors
    ///
    /// Not-found and precondition failures surface here synchronously, as do
    /// version conflicts and store failures once retries are exhausted.
    pub async fn execute<C>(
        &self,
        id: &AggregateIdentifier,
        command: &C,
        metadata: &MetadataScope,
    ) -> Result<CommitOutcome, DomainError>
    where
        C: Command<S>,
    {
        let span = info_span!("command", command = command.command_type(), aggregate = %id);
        self.handler.handle(id, command, metadata).instrument(span).await
    }
}
