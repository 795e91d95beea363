//! Aggregate root abstraction.

use std::any::Any;

use crate::command::{Command, EventSink};
use crate::error::DomainError;
use crate::event::{EventData, EventSet};
use crate::identifier::{AggregateIdentifier, AggregateVersion};
use crate::identity::event_id;
use crate::metadata::MetadataScope;
use crate::serializer::Serializer;
use crate::state::State;

/// Versioned holder of one stream's state plus the events of the last accepted command.
#[derive(Debug, Clone)]
pub struct Root<S: State> {
    state: S,
    version: AggregateVersion,
    changes: Vec<S::Event>,
}

impl<S: State> Default for Root<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> Root<S> {
    /// A root for an aggregate without history.
    #[must_use]
    pub fn new() -> Self {
        Self::restore(S::initial(), AggregateVersion::NONE)
    }

    /// Wraps state reconstructed up to `version`.
    #[must_use]
    pub fn restore(state: S, version: AggregateVersion) -> Self {
        Self {
            state,
            version,
            changes: Vec::new(),
        }
    }

    /// Replays historical events, in log order.
    #[must_use]
    pub fn replay(events: &[S::Event]) -> Self {
        Self::restore(S::fold(events), AggregateVersion::from_stream_length(events.len()))
    }

    /// Current state, including uncommitted changes.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Version of the last persisted event.
    #[must_use]
    pub fn version(&self) -> AggregateVersion {
        self.version
    }

    /// Events produced by the last accepted command.
    #[must_use]
    pub fn changes(&self) -> &[S::Event] {
        &self.changes
    }

    /// Runs a command against the current state and keeps what it emitted.
    ///
    /// Changes from a previously accepted command are discarded first. If the
    /// command fails, state and changes are left as they were before the call
    /// except that the previous changes are gone.
    ///
    /// # Errors
    ///
    /// Propagates the command's rejection.
    pub async fn accept<C>(&mut self, command: &C) -> Result<(), DomainError>
    where
        C: Command<S>,
    {
        self.changes.clear();
        let mut sink = EventSink::new(self.state.clone());
        command.execute(&mut sink).await?;
        let (state, events) = sink.into_parts();
        self.state = state;
        self.changes = events;
        Ok(())
    }

    /// Marks the current changes as persisted.
    pub fn mark_committed(&mut self) {
        self.version = self.version.advance(self.changes.len());
        self.changes.clear();
    }
}

/// Type-erased view of a root, as held by the unit of work.
pub trait AttachedRoot: Send + Sync + std::fmt::Debug {
    /// Version of the last persisted event.
    fn version(&self) -> AggregateVersion;

    /// Returns `true` if the last accepted command produced events.
    fn has_changes(&self) -> bool;

    /// Number of pending events.
    fn pending(&self) -> usize;

    /// Serializes pending events with deterministic identifiers.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if a payload or the metadata cannot be encoded.
    fn encode_changes(
        &self,
        id: &AggregateIdentifier,
        metadata: &MetadataScope,
        serializer: &dyn Serializer,
    ) -> Result<Vec<EventData>, DomainError>;

    /// Marks pending events as persisted.
    fn mark_committed(&mut self);

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutable access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: State> AttachedRoot for Root<S> {
    fn version(&self) -> AggregateVersion {
        self.version
    }

    fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn pending(&self) -> usize {
        self.changes.len()
    }

    fn encode_changes(
        &self,
        id: &AggregateIdentifier,
        metadata: &MetadataScope,
        serializer: &dyn Serializer,
    ) -> Result<Vec<EventData>, DomainError> {
        let mut metadata = metadata.child();
        self.state.seed_metadata(&mut metadata);
        let metadata = metadata.to_bytes(serializer)?;

        self.changes
            .iter()
            .enumerate()
            .map(|(offset, event)| {
                let event_type = event.event_type().into_owned();
                let payload = serializer.serialize(&event.to_payload()?)?;
                Ok(EventData {
                    event_id: event_id(id, self.version, offset, &payload, &event_type),
                    event_type,
                    content_type: serializer.content_type().to_owned(),
                    payload,
                    metadata: metadata.clone(),
                })
            })
            .collect()
    }

    fn mark_committed(&mut self) {
        Root::mark_committed(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Pairs an identifier with its attached root.
///
/// "Nothing loaded" is expressed as `Option::<Aggregate>::None`.
#[derive(Debug, Clone, Copy)]
pub struct Aggregate<'a> {
    /// Stream identifier.
    pub id: &'a AggregateIdentifier,
    /// The attached root.
    pub root: &'a dyn AttachedRoot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventContract};
    use crate::registry::EventRegistry;
    use crate::serializer::JsonSerializer;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::borrow::Cow;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Incremented {
        by: u32,
    }

    impl Event for Incremented {
        const CONTRACT: Option<EventContract> = Some(EventContract::new("Incremented", 1));
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Incremented(Incremented),
    }

    impl From<Incremented> for CounterEvent {
        fn from(value: Incremented) -> Self {
            Self::Incremented(value)
        }
    }

    impl EventSet for CounterEvent {
        fn event_type(&self) -> Cow<'static, str> {
            match self {
                Self::Incremented(_) => Incremented::event_type(),
            }
        }

        fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
            match self {
                Self::Incremented(e) => Ok(serde_json::to_value(e)?),
            }
        }

        fn register(registry: &mut EventRegistry<Self>) {
            registry.register::<Incremented>();
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u32);

    impl State for Counter {
        type Event = CounterEvent;

        fn initial() -> Self {
            Self(0)
        }

        fn apply(&self, event: &Self::Event) -> Self {
            match event {
                CounterEvent::Incremented(e) => Self(self.0 + e.by),
            }
        }
    }

    /// Emits one increment per step, each step seeing the previous ones.
    #[derive(Debug)]
    struct DoubleUntil(u32);

    #[async_trait]
    impl Command<Counter> for DoubleUntil {
        fn command_type(&self) -> &'static str {
            "counter.double_until"
        }

        async fn execute(&self, sink: &mut EventSink<Counter>) -> Result<(), DomainError> {
            while sink.state().0 < self.0 {
                let by = sink.state().0.max(1);
                sink.emit(Incremented { by });
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Reject;

    #[async_trait]
    impl Command<Counter> for Reject {
        fn command_type(&self) -> &'static str {
            "counter.reject"
        }

        async fn execute(&self, sink: &mut EventSink<Counter>) -> Result<(), DomainError> {
            sink.emit(Incremented { by: 100 });
            Err(DomainError::Validation("nope".into()))
        }
    }

    #[tokio::test]
    async fn test_accept_folds_each_emitted_event_before_the_next() {
        // Arrange
        let mut root = Root::<Counter>::new();

        // Act
        root.accept(&DoubleUntil(8)).await.unwrap();

        // Assert
        assert_eq!(root.state(), &Counter(8));
        assert_eq!(
            root.changes(),
            &[
                CounterEvent::Incremented(Incremented { by: 1 }),
                CounterEvent::Incremented(Incremented { by: 1 }),
                CounterEvent::Incremented(Incremented { by: 2 }),
                CounterEvent::Incremented(Incremented { by: 4 }),
            ]
        );
        assert_eq!(root.version(), AggregateVersion::NONE);
    }

    #[tokio::test]
    async fn test_rejected_command_keeps_state() {
        let mut root = Root::<Counter>::restore(Counter(3), AggregateVersion::new(2));
        let err = root.accept(&Reject).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(root.state(), &Counter(3));
        assert!(root.changes().is_empty());
    }

    #[tokio::test]
    async fn test_changes_are_not_reused_across_commands() {
        let mut root = Root::<Counter>::new();
        root.accept(&DoubleUntil(2)).await.unwrap();
        root.accept(&DoubleUntil(4)).await.unwrap();
        assert_eq!(root.changes().len(), 1);
        assert_eq!(root.state(), &Counter(4));
    }

    #[test]
    fn test_replay_version_is_length_minus_one() {
        let events: Vec<CounterEvent> = (0..5).map(|_| Incremented { by: 1 }.into()).collect();
        let root = Root::<Counter>::replay(&events);
        assert_eq!(root.version().value(), 4);
        assert_eq!(root.state(), &Counter(5));
        assert!(Root::<Counter>::replay(&[]).version().is_none());
    }

    #[tokio::test]
    async fn test_mark_committed_moves_version_to_previous_stream_length() {
        let mut root = Root::<Counter>::new();
        root.accept(&DoubleUntil(2)).await.unwrap();
        root.mark_committed();
        assert_eq!(root.version().value(), 1);
        assert!(root.changes().is_empty());
    }

    #[tokio::test]
    async fn test_encode_changes_uses_sequential_offsets() {
        // Arrange
        let id = AggregateIdentifier::new("counter/1");
        let mut root = Root::<Counter>::new();
        root.accept(&DoubleUntil(2)).await.unwrap();

        // Act
        let data = root
            .encode_changes(&id, &MetadataScope::new(), &JsonSerializer)
            .unwrap();

        // Assert
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].event_type, "Incremented@v1");
        assert_eq!(data[0].payload, br#"{"by":1}"#);
        assert_eq!(
            data[0].event_id,
            event_id(&id, AggregateVersion::NONE, 0, &data[0].payload, "Incremented@v1")
        );
        assert_eq!(
            data[1].event_id,
            event_id(&id, AggregateVersion::NONE, 1, &data[1].payload, "Incremented@v1")
        );
        assert_ne!(data[0].event_id, data[1].event_id);
    }
}
