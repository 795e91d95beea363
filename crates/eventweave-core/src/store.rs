//! Stream store collaborator.
//!
//! The runtime is written against these traits; it never implements the log
//! itself. The store supplies ordered streams with optimistic appends and
//! server-tracked persistent subscriptions with ack/nak.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event::{EventData, RecordedEvent};
use crate::identifier::{AggregateIdentifier, ExpectedVersion};

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Stream position of the last event now in the stream.
    pub next_expected_version: u64,
    /// Log position of the last event now in the stream.
    pub log_position: u64,
}

/// Reading and appending streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Reads a stream forward from its first event.
    ///
    /// Returns `Ok(None)` if the stream does not exist.
    async fn read_stream(
        &self,
        stream: &AggregateIdentifier,
    ) -> Result<Option<Vec<RecordedEvent>>, StoreError>;

    /// Appends events if the stream matches `expected`.
    async fn append(
        &self,
        stream: &AggregateIdentifier,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, StoreError>;
}

/// Where a new persistent subscription starts reading the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartPosition {
    /// The first event of the log.
    Start,
    /// Only events written after creation.
    End,
    /// The event at this log position, inclusive.
    Position(u64),
}

/// Settings of a filtered persistent subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Regular expression matched against the whole wire event type.
    pub event_type_filter: String,
    /// First position to deliver.
    pub start: StartPosition,
}

/// Counters reported by the store for a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Events acknowledged so far.
    pub acknowledged: u64,
    /// Events parked for manual intervention.
    pub parked: u64,
    /// Events currently waiting for ack/nak.
    pub in_flight: u64,
}

/// A persistent subscription as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Group name (the subscription's fully qualified contract name).
    pub group_name: String,
    /// Log position of the last event the group acknowledged.
    pub last_known_position: Option<u64>,
    /// Delivery counters.
    pub stats: SubscriptionStats,
}

/// What the consumer asks the store to do with a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NakAction {
    /// Redeliver later.
    Retry,
    /// Move to the dead-letter state.
    Park,
}

/// A message pulled from a persistent subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMessage {
    /// The store confirmed the subscription.
    Confirmation {
        /// Store-side subscription identifier.
        subscription_id: String,
    },
    /// An event to process.
    Event {
        /// The delivered event.
        event: RecordedEvent,
        /// How many times the event was delivered before.
        retry_count: u32,
    },
}

/// An open persistent subscription.
#[async_trait]
pub trait PersistentSubscription: Send {
    /// Waits for the next message. `None` means the store closed the stream.
    async fn next(&mut self) -> Option<Result<SubscriptionMessage, StoreError>>;

    /// Acknowledges a processed event.
    async fn ack(&mut self, event: &RecordedEvent) -> Result<(), StoreError>;

    /// Rejects an event.
    async fn nak(
        &mut self,
        event: &RecordedEvent,
        action: NakAction,
        reason: &str,
    ) -> Result<(), StoreError>;
}

/// Managing and opening persistent subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Lists every persistent subscription.
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>, StoreError>;

    /// Creates a filtered persistent subscription.
    async fn create_subscription(
        &self,
        group_name: &str,
        settings: SubscriptionSettings,
    ) -> Result<(), StoreError>;

    /// Deletes a persistent subscription.
    async fn delete_subscription(&self, group_name: &str) -> Result<(), StoreError>;

    /// Connects to a persistent subscription.
    async fn open_subscription(
        &self,
        group_name: &str,
    ) -> Result<Box<dyn PersistentSubscription>, StoreError>;
}
