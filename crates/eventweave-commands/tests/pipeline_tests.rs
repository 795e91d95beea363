//! Integration tests for the command pipeline.

use std::sync::Arc;
use std::time::Duration;

use eventweave_commands::{CommandBus, CommandPipeline, RoutingPolicy};
use eventweave_core::commit::{CommitConfig, CommitOutcome};
use eventweave_core::error::{DomainError, StoreError};
use eventweave_core::identifier::{AggregateIdentifier, AggregateVersion, ExpectedVersion};
use eventweave_core::metadata::{COMMAND_KEY, MetadataScope, Multiplicity};
use eventweave_core::repository::Repository;
use eventweave_core::serializer::{JsonSerializer, Serializer};
use eventweave_core::store::EventStore;
use eventweave_store::MemoryEventStore;
use eventweave_test_support::{
    Counter, Fail, FlakyEventStore, Increment, Open, RecordingEventStore,
};

fn serializer() -> Arc<dyn Serializer> {
    Arc::new(JsonSerializer)
}

fn commit_config() -> CommitConfig {
    CommitConfig {
        max_attempts: 5,
        backoff: Duration::from_millis(1),
    }
}

fn pipeline(store: Arc<dyn EventStore>, policy: RoutingPolicy) -> CommandPipeline<Counter> {
    CommandPipeline::new(store, serializer(), policy, commit_config())
}

// --- automatic routing ---

#[tokio::test]
async fn test_automatic_routing_creates_then_modifies() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);
    let id = AggregateIdentifier::new("counter/1");

    // Act
    pipeline
        .execute(&id, &Increment { by: 2, times: 1 }, &MetadataScope::new())
        .await
        .unwrap();
    let outcome = pipeline
        .execute(&id, &Increment { by: 3, times: 1 }, &MetadataScope::new())
        .await
        .unwrap();

    // Assert
    assert!(matches!(
        outcome,
        CommitOutcome::Committed { version, .. } if version == AggregateVersion::new(1)
    ));
    let root = Repository::<Counter>::new(store, serializer())
        .load(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(root.state().value, 5);
}

#[tokio::test]
async fn test_end_to_end_two_events_replay_at_version_one() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);
    let id = AggregateIdentifier::new("a/1");

    // Act
    pipeline
        .execute(&id, &Increment { by: 1, times: 2 }, &MetadataScope::new())
        .await
        .unwrap();

    // Assert
    let positions: Vec<u64> = store
        .stream_events(&id)
        .iter()
        .map(|e| e.stream_position)
        .collect();
    assert_eq!(positions, vec![0, 1]);
    let root = Repository::<Counter>::new(store, serializer())
        .load(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(root.version(), AggregateVersion::new(1));
}

#[tokio::test]
async fn test_command_emitting_nothing_writes_nothing() {
    let store = Arc::new(RecordingEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);

    let outcome = pipeline
        .execute(
            &"counter/1".into(),
            &Increment { by: 1, times: 0 },
            &MetadataScope::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::NoChanges);
    assert!(store.appends().is_empty());
}

#[tokio::test]
async fn test_rejected_command_writes_nothing() {
    let store = Arc::new(RecordingEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);

    let err = pipeline
        .execute(&"counter/1".into(), &Fail, &MetadataScope::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Validation(_)));
    assert!(store.appends().is_empty());
}

// --- marker routing ---

#[tokio::test]
async fn test_marker_routing_modification_of_missing_aggregate_is_not_found() {
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store, RoutingPolicy::MarkerInterface);

    let err = pipeline
        .execute(
            &"counter/404".into(),
            &Increment { by: 1, times: 1 },
            &MetadataScope::new(),
        )
        .await
        .unwrap_err();

    match err {
        DomainError::AggregateNotFound(id) => assert_eq!(id.as_str(), "counter/404"),
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_marker_routing_creation_does_not_read_the_stream() {
    // Arrange
    let store = Arc::new(RecordingEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::MarkerInterface);
    let id = AggregateIdentifier::new("counter/1");

    // Act
    pipeline
        .execute(&id, &Open { owner: "ada".into() }, &MetadataScope::new())
        .await
        .unwrap();

    // Assert
    assert!(store.reads().is_empty());
    assert_eq!(store.appends()[0].1, ExpectedVersion::NoStream);
}

#[tokio::test]
async fn test_marker_routing_creation_of_existing_aggregate_conflicts_on_append() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::MarkerInterface);
    let id = AggregateIdentifier::new("counter/1");
    pipeline
        .execute(&id, &Open { owner: "ada".into() }, &MetadataScope::new())
        .await
        .unwrap();

    // Act
    let err = pipeline
        .execute(&id, &Open { owner: "bob".into() }, &MetadataScope::new())
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(
        err,
        DomainError::ConcurrencyConflict {
            expected: ExpectedVersion::NoStream,
            actual: Some(0),
            ..
        }
    ));
    assert_eq!(store.stream_events(&id).len(), 1);
}

#[tokio::test]
async fn test_marker_routing_modification_of_existing_aggregate_succeeds() {
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::MarkerInterface);
    let id = AggregateIdentifier::new("counter/1");

    pipeline
        .execute(&id, &Open { owner: "ada".into() }, &MetadataScope::new())
        .await
        .unwrap();
    pipeline
        .execute(&id, &Increment { by: 4, times: 1 }, &MetadataScope::new())
        .await
        .unwrap();

    assert_eq!(store.stream_events(&id).len(), 2);
}

// --- metadata ---

#[tokio::test]
async fn test_written_metadata_carries_command_type_and_inherited_entries() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);
    let id = AggregateIdentifier::new("counter/1");
    let parent = MetadataScope::new().with("tenant", "acme", Multiplicity::Single);

    // Act
    pipeline
        .execute(&id, &Increment { by: 7, times: 1 }, &parent)
        .await
        .unwrap();

    // Assert
    let events = store.stream_events(&id);
    let metadata = MetadataScope::from_bytes(&events[0].metadata, &JsonSerializer).unwrap();
    assert_eq!(metadata.get_str(COMMAND_KEY), Some("counter.increment"));
    assert_eq!(metadata.get_str("tenant"), Some("acme"));
    assert_eq!(metadata.get("increment_by"), Some(&serde_json::json!(7)));
    assert!(parent.get(COMMAND_KEY).is_none());
}

// --- retries ---

#[tokio::test]
async fn test_transient_append_failure_is_retried_by_pipeline() {
    let store = Arc::new(FlakyEventStore::transient(4));
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);

    pipeline
        .execute(
            &"counter/1".into(),
            &Increment { by: 1, times: 1 },
            &MetadataScope::new(),
        )
        .await
        .unwrap();

    assert_eq!(store.attempts(), 5);
}

#[tokio::test]
async fn test_conflict_from_store_is_not_retried_by_pipeline() {
    let store = Arc::new(FlakyEventStore::new(
        1,
        StoreError::WrongExpectedVersion {
            stream: "counter/1".into(),
            expected: ExpectedVersion::NoStream,
            actual: Some(0),
        },
    ));
    let pipeline = pipeline(store.clone(), RoutingPolicy::Automatic);

    let err = pipeline
        .execute(
            &"counter/1".into(),
            &Increment { by: 1, times: 1 },
            &MetadataScope::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
    assert_eq!(store.attempts(), 1);
}

// --- bus ---

#[tokio::test]
async fn test_bus_dispatches_through_fresh_pipelines() {
    let store = Arc::new(MemoryEventStore::new());
    let bus = CommandBus::new(
        store.clone(),
        serializer(),
        RoutingPolicy::MarkerInterface,
        commit_config(),
    );
    let id = AggregateIdentifier::new("counter/9");

    bus.execute::<Counter, _>(&id, &Open { owner: "ada".into() }, &MetadataScope::new())
        .await
        .unwrap();
    bus.execute::<Counter, _>(&id, &Increment { by: 1, times: 3 }, &MetadataScope::new())
        .await
        .unwrap();

    assert_eq!(store.stream_events(&id).len(), 4);
}
