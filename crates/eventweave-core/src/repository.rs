//! Loading roots by replaying their streams.

use std::sync::Arc;

use tracing::debug;

use crate::aggregate::Root;
use crate::error::DomainError;
use crate::identifier::AggregateIdentifier;
use crate::registry::EventRegistry;
use crate::serializer::Serializer;
use crate::state::State;
use crate::store::EventStore;
use crate::unit_of_work::UnitOfWork;

/// Replays streams of state `S` and attaches the resulting roots to a unit of work.
pub struct Repository<S: State> {
    store: Arc<dyn EventStore>,
    serializer: Arc<dyn Serializer>,
    registry: Arc<EventRegistry<S::Event>>,
}

impl<S: State> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            serializer: Arc::clone(&self.serializer),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: State> std::fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("state", &std::any::type_name::<S>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<S: State> Repository<S> {
    /// Creates a repository using the state's own event registry.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, serializer: Arc<dyn Serializer>) -> Self {
        Self::with_registry(store, serializer, Arc::new(<S::Event as crate::event::EventSet>::registry()))
    }

    /// Creates a repository with an explicit registry.
    #[must_use]
    pub fn with_registry(
        store: Arc<dyn EventStore>,
        serializer: Arc<dyn Serializer>,
        registry: Arc<EventRegistry<S::Event>>,
    ) -> Self {
        Self {
            store,
            serializer,
            registry,
        }
    }

    /// The store this repository reads from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The serializer used for payloads and metadata.
    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// Replays a stream without touching any unit of work.
    ///
    /// Returns `Ok(None)` if the stream does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SystemStream` for reserved stream names,
    /// `DomainError::UnknownEventType` or `DomainError::Serialization` if a
    /// stored event does not decode, and `DomainError::Store` on read failures.
    pub async fn load(&self, id: &AggregateIdentifier) -> Result<Option<Root<S>>, DomainError> {
        if id.is_system_stream() {
            return Err(DomainError::SystemStream(id.clone()));
        }

        let Some(recorded) = self.store.read_stream(id).await? else {
            debug!(aggregate = %id, "stream not found");
            return Ok(None);
        };

        let events = recorded
            .iter()
            .map(|event| {
                self.registry
                    .decode(&event.event_type, &event.payload, self.serializer.as_ref())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let root = Root::replay(&events);
        debug!(aggregate = %id, version = %root.version(), "replayed stream");
        Ok(Some(root))
    }

    /// Returns the attached root, or replays and attaches it.
    ///
    /// An already attached root wins without any I/O. Returns `Ok(None)` if
    /// the stream does not exist, meaning the aggregate may be created here.
    ///
    /// # Errors
    ///
    /// See [`Repository::load`]; also `DomainError::RootTypeMismatch` if the
    /// identifier is attached with another state type.
    pub async fn try_get_root<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        id: &AggregateIdentifier,
    ) -> Result<Option<&'u mut Root<S>>, DomainError> {
        if uow.contains(id) {
            return uow.get_mut::<S>(id).map(Some);
        }

        match self.load(id).await? {
            Some(root) => {
                uow.attach(id.clone(), root)?;
                uow.get_mut::<S>(id).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Like [`Repository::try_get_root`], but a missing aggregate is an error.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the stream does not exist.
    pub async fn get_root<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        id: &AggregateIdentifier,
    ) -> Result<&'u mut Root<S>, DomainError> {
        self.try_get_root(uow, id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound(id.clone()))
    }

    /// Attaches a freshly created root.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateAttach` if the identifier is already attached.
    pub fn add<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        id: &AggregateIdentifier,
        root: Root<S>,
    ) -> Result<&'u mut Root<S>, DomainError> {
        uow.attach(id.clone(), root)?;
        uow.get_mut::<S>(id)
    }

    /// Loads the root if its stream exists, otherwise attaches a new one.
    ///
    /// # Errors
    ///
    /// See [`Repository::try_get_root`].
    pub async fn try_get_or_add<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        id: &AggregateIdentifier,
    ) -> Result<&'u mut Root<S>, DomainError> {
        if uow.contains(id) {
            return uow.get_mut::<S>(id);
        }
        let root = self.load(id).await?.unwrap_or_default();
        self.add(uow, id, root)
    }
}
