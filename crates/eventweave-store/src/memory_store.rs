//! In-memory implementation of `EventStore` and `SubscriptionStore`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use eventweave_core::error::StoreError;
use eventweave_core::event::{EventData, RecordedEvent};
use eventweave_core::identifier::{AggregateIdentifier, ExpectedVersion};
use eventweave_core::store::{
    AppendResult, EventStore, PersistentSubscription, StartPosition, SubscriptionInfo,
    SubscriptionSettings, SubscriptionStore,
};

use crate::subscription::{Group, MemorySubscription};

/// Everything the store holds, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct Log {
    /// The global log; an event's log position is its index.
    pub(crate) events: Vec<RecordedEvent>,
    /// Log indices of every stream, in stream order.
    pub(crate) streams: HashMap<AggregateIdentifier, Vec<usize>>,
    /// Persistent subscriptions by group name.
    pub(crate) groups: HashMap<String, Group>,
    connections: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    log: Mutex<Log>,
    pub(crate) notify: Notify,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Log> {
        // A panic while holding the lock leaves the log consistent: every
        // mutation is a push or a counter update.
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-memory stream store.
///
/// Cloning is cheap; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    shared: Arc<Shared>,
}

impl MemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the whole log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().events.len()
    }

    /// Returns `true` if nothing was ever appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the whole log in log order.
    #[must_use]
    pub fn all_events(&self) -> Vec<RecordedEvent> {
        self.shared.lock().events.clone()
    }

    /// A copy of one stream; empty if the stream does not exist.
    #[must_use]
    pub fn stream_events(&self, stream: &AggregateIdentifier) -> Vec<RecordedEvent> {
        let log = self.shared.lock();
        log.streams
            .get(stream)
            .map(|indices| indices.iter().map(|&i| log.events[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Events parked by a subscription group.
    #[must_use]
    pub fn parked(&self, group_name: &str) -> Vec<RecordedEvent> {
        let log = self.shared.lock();
        log.groups
            .get(group_name)
            .map(|group| group.parked.iter().map(|&i| log.events[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Looks up one persistent subscription.
    #[must_use]
    pub fn subscription(&self, group_name: &str) -> Option<SubscriptionInfo> {
        self.shared
            .lock()
            .groups
            .get(group_name)
            .map(|group| group.info(group_name))
    }

    /// Drops every open subscription connection.
    ///
    /// Open streams end; in-flight events are queued for redelivery with
    /// their retry count increased. Consumers have to reconnect.
    pub fn drop_subscriptions(&self) {
        {
            let mut log = self.shared.lock();
            for group in log.groups.values_mut() {
                group.drop_connections();
            }
        }
        info!("dropped all subscription connections");
        self.shared.notify.notify_waiters();
    }
}

fn last_position(indices: Option<&Vec<usize>>) -> Option<u64> {
    indices.and_then(|indices| indices.len().checked_sub(1)).map(|p| p as u64)
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn read_stream(
        &self,
        stream: &AggregateIdentifier,
    ) -> Result<Option<Vec<RecordedEvent>>, StoreError> {
        let log = self.shared.lock();
        Ok(log
            .streams
            .get(stream)
            .map(|indices| indices.iter().map(|&i| log.events[i].clone()).collect()))
    }

    async fn append(
        &self,
        stream: &AggregateIdentifier,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, StoreError> {
        let mut log = self.shared.lock();
        let existing = log.streams.get(stream);
        let current = last_position(existing);

        if let Some(indices) = existing.filter(|_| !events.is_empty()) {
            let known: HashSet<Uuid> = indices.iter().map(|&i| log.events[i].event_id).collect();
            if events.iter().all(|event| known.contains(&event.event_id)) {
                debug!(stream = %stream, "events already appended, ignoring batch");
                let log_position = indices.last().map_or(0, |&i| i as u64);
                return Ok(AppendResult {
                    next_expected_version: current.unwrap_or(0),
                    log_position,
                });
            }
        }

        let matches = match expected {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => current.is_none(),
            ExpectedVersion::Exact(version) => current == Some(version),
        };
        if !matches {
            return Err(StoreError::WrongExpectedVersion {
                stream: stream.clone(),
                expected,
                actual: current,
            });
        }

        let created = Utc::now();
        let first = current.map_or(0, |c| c + 1);
        let mut indices = Vec::with_capacity(events.len());
        for (stream_position, data) in (first..).zip(events) {
            let index = log.events.len();
            log.events.push(RecordedEvent {
                event_id: data.event_id,
                stream: stream.clone(),
                event_type: data.event_type,
                payload: data.payload,
                metadata: data.metadata,
                stream_position,
                log_position: index as u64,
                created,
            });
            indices.push(index);
        }

        let appended = indices.len();
        let last_index = indices.last().copied();
        if appended > 0 {
            log.streams.entry(stream.clone()).or_default().extend(indices);
        }
        let next_expected_version = last_position(log.streams.get(stream)).unwrap_or(0);
        let log_position = last_index.map_or(0, |i| i as u64);
        drop(log);

        if appended > 0 {
            debug!(stream = %stream, events = appended, "appended");
            self.shared.notify.notify_waiters();
        }
        Ok(AppendResult {
            next_expected_version,
            log_position,
        })
    }
}

#[async_trait]
impl SubscriptionStore for MemoryEventStore {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>, StoreError> {
        let log = self.shared.lock();
        let mut infos: Vec<SubscriptionInfo> = log
            .groups
            .iter()
            .map(|(name, group)| group.info(name))
            .collect();
        infos.sort_by(|a, b| a.group_name.cmp(&b.group_name));
        Ok(infos)
    }

    async fn create_subscription(
        &self,
        group_name: &str,
        settings: SubscriptionSettings,
    ) -> Result<(), StoreError> {
        let filter = Regex::new(&settings.event_type_filter)
            .map_err(|e| StoreError::Other(format!("invalid event type filter: {e}")))?;

        let mut log = self.shared.lock();
        if log.groups.contains_key(group_name) {
            return Err(StoreError::SubscriptionExists(group_name.to_owned()));
        }
        let cursor = match settings.start {
            StartPosition::Start => 0,
            StartPosition::End => log.events.len(),
            StartPosition::Position(position) => {
                usize::try_from(position).map_or(log.events.len(), |p| p.min(log.events.len()))
            }
        };
        log.groups.insert(group_name.to_owned(), Group::new(filter, cursor));
        info!(group = group_name, cursor, "created subscription");
        Ok(())
    }

    async fn delete_subscription(&self, group_name: &str) -> Result<(), StoreError> {
        let removed = self.shared.lock().groups.remove(group_name);
        if removed.is_none() {
            return Err(StoreError::SubscriptionNotFound(group_name.to_owned()));
        }
        info!(group = group_name, "deleted subscription");
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn open_subscription(
        &self,
        group_name: &str,
    ) -> Result<Box<dyn PersistentSubscription>, StoreError> {
        let mut log = self.shared.lock();
        log.connections += 1;
        let connection = log.connections;
        let generation = log
            .groups
            .get(group_name)
            .map(Group::generation)
            .ok_or_else(|| StoreError::SubscriptionNotFound(group_name.to_owned()))?;
        drop(log);

        debug!(group = group_name, connection, "opened subscription");
        Ok(Box::new(MemorySubscription::new(
            Arc::clone(&self.shared),
            group_name.to_owned(),
            format!("{group_name}::{connection}"),
            generation,
        )))
    }
}
