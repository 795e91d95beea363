//! Test stores — `EventStore` wrappers that record or inject failures.

use std::sync::Mutex;

use async_trait::async_trait;
use eventweave_core::error::StoreError;
use eventweave_core::event::{EventData, RecordedEvent};
use eventweave_core::identifier::{AggregateIdentifier, ExpectedVersion};
use eventweave_core::store::{
    AppendResult, EventStore, PersistentSubscription, SubscriptionInfo, SubscriptionSettings,
    SubscriptionStore,
};
use eventweave_store::MemoryEventStore;

/// A store that records every `read_stream` and `append` call and delegates
/// to an in-memory store.
#[derive(Debug, Default)]
pub struct RecordingEventStore {
    inner: MemoryEventStore,
    reads: Mutex<Vec<AggregateIdentifier>>,
    appends: Mutex<Vec<(AggregateIdentifier, ExpectedVersion, Vec<EventData>)>>,
}

impl RecordingEventStore {
    /// Create a recording store over an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recording store over an existing log.
    #[must_use]
    pub fn wrapping(inner: MemoryEventStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn inner(&self) -> &MemoryEventStore {
        &self.inner
    }

    /// Returns a snapshot of every stream that was read.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn reads(&self) -> Vec<AggregateIdentifier> {
        self.reads.lock().unwrap().clone()
    }

    /// Returns a snapshot of every append call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appends(&self) -> Vec<(AggregateIdentifier, ExpectedVersion, Vec<EventData>)> {
        self.appends.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for RecordingEventStore {
    async fn read_stream(
        &self,
        stream: &AggregateIdentifier,
    ) -> Result<Option<Vec<RecordedEvent>>, StoreError> {
        self.reads.lock().unwrap().push(stream.clone());
        self.inner.read_stream(stream).await
    }

    async fn append(
        &self,
        stream: &AggregateIdentifier,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, StoreError> {
        self.appends
            .lock()
            .unwrap()
            .push((stream.clone(), expected, events.clone()));
        self.inner.append(stream, expected, events).await
    }
}

/// A store that fails every call with the configured error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventStore {
    error: StoreError,
}

impl FailingEventStore {
    /// Fails with `error` on every call.
    #[must_use]
    pub fn new(error: StoreError) -> Self {
        Self { error }
    }

    /// Fails with `StoreError::Unavailable`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(StoreError::Unavailable("connection refused".into()))
    }

    /// Rejects every append as if `stream` had moved on to `actual`.
    #[must_use]
    pub fn conflicting(stream: impl Into<AggregateIdentifier>, actual: u64) -> Self {
        Self::new(StoreError::WrongExpectedVersion {
            stream: stream.into(),
            expected: ExpectedVersion::Any,
            actual: Some(actual),
        })
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn read_stream(
        &self,
        _stream: &AggregateIdentifier,
    ) -> Result<Option<Vec<RecordedEvent>>, StoreError> {
        Err(self.error.clone())
    }

    async fn append(
        &self,
        _stream: &AggregateIdentifier,
        _expected: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<AppendResult, StoreError> {
        Err(self.error.clone())
    }
}

/// A store whose first `failures` appends fail with the configured error,
/// after which appends go through. Reads always go through.
///
/// With [`FlakyEventStore::landing`] the failing appends still reach the
/// log, like a write whose response timed out.
#[derive(Debug)]
pub struct FlakyEventStore {
    inner: MemoryEventStore,
    error: StoreError,
    remaining: Mutex<u32>,
    attempts: Mutex<u32>,
    landing: bool,
}

impl FlakyEventStore {
    /// Fails the first `failures` appends with `error`.
    #[must_use]
    pub fn new(failures: u32, error: StoreError) -> Self {
        Self {
            inner: MemoryEventStore::new(),
            error,
            remaining: Mutex::new(failures),
            attempts: Mutex::new(0),
            landing: false,
        }
    }

    /// Fails the first `failures` appends with a deadline error.
    #[must_use]
    pub fn transient(failures: u32) -> Self {
        Self::new(failures, StoreError::DeadlineExceeded("append timed out".into()))
    }

    /// Lets failing appends reach the log before reporting the error.
    #[must_use]
    pub fn landing(mut self) -> Self {
        self.landing = true;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn inner(&self) -> &MemoryEventStore {
        &self.inner
    }

    /// Number of append calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EventStore for FlakyEventStore {
    async fn read_stream(
        &self,
        stream: &AggregateIdentifier,
    ) -> Result<Option<Vec<RecordedEvent>>, StoreError> {
        self.inner.read_stream(stream).await
    }

    async fn append(
        &self,
        stream: &AggregateIdentifier,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, StoreError> {
        *self.attempts.lock().unwrap() += 1;
        let fail = {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };
        if !fail {
            return self.inner.append(stream, expected, events).await;
        }
        if self.landing {
            self.inner.append(stream, expected, events).await?;
        }
        Err(self.error.clone())
    }
}

/// A subscription store that records creations and deletions and delegates
/// to an in-memory store.
#[derive(Debug, Default)]
pub struct RecordingSubscriptionStore {
    inner: MemoryEventStore,
    created: Mutex<Vec<(String, SubscriptionSettings)>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingSubscriptionStore {
    /// Create a recording store over an existing log.
    #[must_use]
    pub fn wrapping(inner: MemoryEventStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn inner(&self) -> &MemoryEventStore {
        &self.inner
    }

    /// Returns a snapshot of every created subscription with its settings.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn created(&self) -> Vec<(String, SubscriptionSettings)> {
        self.created.lock().unwrap().clone()
    }

    /// Returns a snapshot of every deleted group name.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionStore for RecordingSubscriptionStore {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>, StoreError> {
        self.inner.list_subscriptions().await
    }

    async fn create_subscription(
        &self,
        group_name: &str,
        settings: SubscriptionSettings,
    ) -> Result<(), StoreError> {
        self.created
            .lock()
            .unwrap()
            .push((group_name.to_owned(), settings.clone()));
        self.inner.create_subscription(group_name, settings).await
    }

    async fn delete_subscription(&self, group_name: &str) -> Result<(), StoreError> {
        self.deleted.lock().unwrap().push(group_name.to_owned());
        self.inner.delete_subscription(group_name).await
    }

    async fn open_subscription(
        &self,
        group_name: &str,
    ) -> Result<Box<dyn PersistentSubscription>, StoreError> {
        self.inner.open_subscription(group_name).await
    }
}
