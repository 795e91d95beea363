//! Integration tests for the repository and the commit protocol.

use std::sync::Arc;
use std::time::Duration;

use eventweave_core::aggregate::Root;
use eventweave_core::commit::{CommitConfig, CommitOutcome, CommitScope, Committer};
use eventweave_core::error::{DomainError, StoreError};
use eventweave_core::identifier::{AggregateIdentifier, AggregateVersion, ExpectedVersion};
use eventweave_core::identity::event_id;
use eventweave_core::metadata::{MetadataScope, Multiplicity};
use eventweave_core::repository::Repository;
use eventweave_core::serializer::{JsonSerializer, Serializer};
use eventweave_core::store::EventStore;
use eventweave_core::unit_of_work::UnitOfWork;
use eventweave_store::MemoryEventStore;
use eventweave_test_support::{
    Counter, FailingEventStore, FlakyEventStore, Increment, Open, RecordingEventStore,
};

fn serializer() -> Arc<dyn Serializer> {
    Arc::new(JsonSerializer)
}

fn fast_config() -> CommitConfig {
    CommitConfig {
        max_attempts: 5,
        backoff: Duration::from_millis(1),
    }
}

async fn commit_increment(
    store: Arc<dyn EventStore>,
    id: &AggregateIdentifier,
    times: usize,
) -> Result<CommitOutcome, DomainError> {
    commit_increment_with(store, id, times, fast_config()).await
}

async fn commit_increment_with(
    store: Arc<dyn EventStore>,
    id: &AggregateIdentifier,
    times: usize,
    config: CommitConfig,
) -> Result<CommitOutcome, DomainError> {
    let repository = Repository::<Counter>::new(Arc::clone(&store), serializer());
    let committer = Committer::new(store, serializer(), config);
    let mut uow = UnitOfWork::new();
    let mut scope = CommitScope::open(&mut uow, &committer);

    let root = repository.try_get_or_add(scope.unit_of_work(), id).await?;
    root.accept(&Increment { by: 1, times }).await?;
    scope.complete();
    scope.close(&MetadataScope::new()).await
}

// --- repository ---

#[tokio::test]
async fn test_try_get_root_returns_none_for_missing_stream() {
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    let repository = Repository::<Counter>::new(store, serializer());
    let mut uow = UnitOfWork::new();

    let root = repository
        .try_get_root(&mut uow, &"counter/1".into())
        .await
        .unwrap();

    assert!(root.is_none());
    assert!(uow.is_empty());
}

#[tokio::test]
async fn test_attached_root_wins_without_reading() {
    // Arrange
    let store = Arc::new(RecordingEventStore::new());
    let repository = Repository::<Counter>::new(store.clone(), serializer());
    let mut uow = UnitOfWork::new();
    let id = AggregateIdentifier::new("counter/1");
    let mut root = Root::<Counter>::new();
    root.accept(&Open { owner: "ada".into() }).await.unwrap();
    repository.add(&mut uow, &id, root).unwrap();

    // Act
    let found = repository.try_get_root(&mut uow, &id).await.unwrap().unwrap();

    // Assert
    assert_eq!(found.state().owner.as_deref(), Some("ada"));
    assert!(store.reads().is_empty());
}

#[tokio::test]
async fn test_loaded_root_is_attached_once() {
    // Arrange
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    let id = AggregateIdentifier::new("counter/1");
    commit_increment(Arc::clone(&store), &id, 3).await.unwrap();
    let repository = Repository::<Counter>::new(store, serializer());
    let mut uow = UnitOfWork::new();

    // Act
    let version = repository
        .try_get_root(&mut uow, &id)
        .await
        .unwrap()
        .map(|root| root.version());
    let again = repository.try_get_root(&mut uow, &id).await.unwrap();

    // Assert
    assert_eq!(version, Some(AggregateVersion::new(2)));
    assert_eq!(again.unwrap().state().value, 3);
    assert_eq!(uow.len(), 1);
}

#[tokio::test]
async fn test_loading_system_stream_is_a_precondition_violation() {
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    let repository = Repository::<Counter>::new(store, serializer());
    let mut uow = UnitOfWork::new();

    let err = repository
        .try_get_root(&mut uow, &"$all".into())
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::SystemStream(_)));
}

#[tokio::test]
async fn test_get_root_reports_missing_aggregate() {
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    let repository = Repository::<Counter>::new(store, serializer());
    let mut uow = UnitOfWork::new();

    let err = repository
        .get_root(&mut uow, &"counter/404".into())
        .await
        .unwrap_err();

    match err {
        DomainError::AggregateNotFound(id) => assert_eq!(id.as_str(), "counter/404"),
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
}

// --- commit ---

#[tokio::test]
async fn test_two_events_on_new_aggregate_commit_with_sequential_offsets() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let id = AggregateIdentifier::new("a/1");

    // Act
    let outcome = commit_increment(store.clone(), &id, 2).await.unwrap();

    // Assert
    let recorded = store.stream_events(&id);
    assert_eq!(recorded.len(), 2);
    for (offset, event) in recorded.iter().enumerate() {
        assert_eq!(
            event.event_id,
            event_id(
                &id,
                AggregateVersion::NONE,
                offset,
                &event.payload,
                "Tests.Counter.Incremented@v1"
            )
        );
    }
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            stream: id.clone(),
            event_ids: recorded.iter().map(|e| e.event_id).collect(),
            version: AggregateVersion::new(1),
        }
    );

    let repository = Repository::<Counter>::new(store, serializer());
    let replayed = repository.load(&id).await.unwrap().unwrap();
    assert_eq!(replayed.version(), AggregateVersion::new(1));
}

#[tokio::test]
async fn test_commit_appends_with_expected_version_of_loaded_root() {
    let store = Arc::new(RecordingEventStore::new());
    let id = AggregateIdentifier::new("counter/1");

    commit_increment(store.clone(), &id, 2).await.unwrap();
    commit_increment(store.clone(), &id, 1).await.unwrap();

    let expected: Vec<ExpectedVersion> = store.appends().iter().map(|(_, v, _)| *v).collect();
    assert_eq!(expected, vec![ExpectedVersion::NoStream, ExpectedVersion::Exact(1)]);
}

#[tokio::test]
async fn test_commit_carries_scope_and_command_metadata() {
    // Arrange
    let store = Arc::new(MemoryEventStore::new());
    let committer = Committer::new(store.clone(), serializer(), fast_config());
    let id = AggregateIdentifier::new("counter/1");
    let mut uow = UnitOfWork::new();
    let mut root = Root::<Counter>::new();
    root.accept(&Open { owner: "ada".into() }).await.unwrap();
    uow.attach(id.clone(), root).unwrap();
    let metadata = MetadataScope::new().with("tenant", "acme", Multiplicity::Single);

    // Act
    committer.commit(&mut uow, &metadata).await.unwrap();

    // Assert
    let recorded = store.stream_events(&id);
    let written = MetadataScope::from_bytes(&recorded[0].metadata, &JsonSerializer).unwrap();
    assert_eq!(written.get_str("tenant"), Some("acme"));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = Arc::new(FlakyEventStore::transient(2));
    let id = AggregateIdentifier::new("counter/1");

    let outcome = commit_increment(store.clone(), &id, 1).await.unwrap();

    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    assert_eq!(store.attempts(), 3);
    assert_eq!(store.inner().stream_events(&id).len(), 1);
}

#[tokio::test]
async fn test_retried_append_that_landed_is_not_duplicated() {
    let store = Arc::new(FlakyEventStore::transient(1).landing());
    let id = AggregateIdentifier::new("counter/1");

    commit_increment(store.clone(), &id, 2).await.unwrap();

    assert_eq!(store.attempts(), 2);
    assert_eq!(store.inner().stream_events(&id).len(), 2);
}

#[tokio::test]
async fn test_transient_failures_give_up_after_max_attempts() {
    let store = Arc::new(FlakyEventStore::transient(10));

    let err = commit_increment(store.clone(), &"counter/1".into(), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Store(StoreError::DeadlineExceeded(_))));
    assert_eq!(store.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_grows_with_each_attempt() {
    // Arrange
    let store = Arc::new(FlakyEventStore::transient(4));
    let config = CommitConfig {
        max_attempts: 5,
        backoff: Duration::from_millis(100),
    };
    let started = tokio::time::Instant::now();

    // Act
    commit_increment_with(store.clone(), &"counter/1".into(), 1, config)
        .await
        .unwrap();

    // Assert
    assert_eq!(store.attempts(), 5);
    assert_eq!(started.elapsed(), Duration::from_millis(100 + 200 + 300 + 400));
}

#[tokio::test(start_paused = true)]
async fn test_version_conflict_returns_without_waiting() {
    // Arrange
    let store = Arc::new(FlakyEventStore::new(
        1,
        StoreError::WrongExpectedVersion {
            stream: "counter/1".into(),
            expected: ExpectedVersion::NoStream,
            actual: Some(0),
        },
    ));
    let config = CommitConfig {
        max_attempts: 5,
        backoff: Duration::from_millis(100),
    };
    let started = tokio::time::Instant::now();

    // Act
    let err = commit_increment_with(store.clone(), &"counter/1".into(), 1, config)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(store.attempts(), 1);
}

#[tokio::test]
async fn test_unknown_status_is_transient_too() {
    let store = Arc::new(FlakyEventStore::new(1, StoreError::Unknown("status 2".into())));

    commit_increment(store.clone(), &"counter/1".into(), 1)
        .await
        .unwrap();

    assert_eq!(store.attempts(), 2);
}

#[tokio::test]
async fn test_version_conflict_is_not_retried() {
    // Arrange
    let store = Arc::new(FlakyEventStore::new(
        3,
        StoreError::WrongExpectedVersion {
            stream: "counter/1".into(),
            expected: ExpectedVersion::NoStream,
            actual: Some(4),
        },
    ));

    // Act
    let err = commit_increment(store.clone(), &"counter/1".into(), 1)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(
        err,
        DomainError::ConcurrencyConflict {
            actual: Some(4),
            ..
        }
    ));
    assert_eq!(store.attempts(), 1);
}

#[tokio::test]
async fn test_conflict_reports_stream_and_actual_position() {
    // Arrange
    let store: Arc<dyn EventStore> = Arc::new(FailingEventStore::conflicting("counter/9", 2));
    let committer = Committer::new(store, serializer(), fast_config());
    let mut uow = UnitOfWork::new();
    uow.attach("counter/9".into(), Root::<Counter>::new()).unwrap();
    uow.get_mut::<Counter>(&"counter/9".into())
        .unwrap()
        .accept(&Open { owner: "ann".into() })
        .await
        .unwrap();

    // Act
    let err = committer
        .commit(&mut uow, &MetadataScope::new())
        .await
        .unwrap_err();

    // Assert
    match err {
        DomainError::ConcurrencyConflict { stream, actual, .. } => {
            assert_eq!(stream.as_str(), "counter/9");
            assert_eq!(actual, Some(2));
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(uow.get::<Counter>(&"counter/9".into()).unwrap().changes().len(), 1);
}

#[tokio::test]
async fn test_non_transient_failure_propagates_immediately() {
    let store = Arc::new(FailingEventStore::unavailable());

    let err = commit_increment(store, &"counter/1".into(), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Store(StoreError::Unavailable(_))));
}

// --- scope ---

#[tokio::test]
async fn test_incomplete_scope_discards_changes_and_clears() {
    // Arrange
    let store = Arc::new(RecordingEventStore::new());
    let committer = Committer::new(store.clone(), serializer(), fast_config());
    let mut uow = UnitOfWork::new();

    // Act
    {
        let mut scope = CommitScope::open(&mut uow, &committer);
        let mut root = Root::<Counter>::new();
        root.accept(&Open { owner: "ada".into() }).await.unwrap();
        scope.unit_of_work().attach("counter/1".into(), root).unwrap();
        let outcome = scope.close(&MetadataScope::new()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::NoChanges);
    }

    // Assert
    assert!(store.appends().is_empty());
    assert!(uow.is_empty());
}

#[tokio::test]
async fn test_failed_commit_still_clears_unit_of_work() {
    let store = Arc::new(FailingEventStore::unavailable());
    let committer = Committer::new(store, serializer(), fast_config());
    let mut uow = UnitOfWork::new();

    {
        let mut scope = CommitScope::open(&mut uow, &committer);
        let mut root = Root::<Counter>::new();
        root.accept(&Open { owner: "ada".into() }).await.unwrap();
        scope.unit_of_work().attach("counter/1".into(), root).unwrap();
        scope.complete();
        assert!(scope.close(&MetadataScope::new()).await.is_err());
    }

    assert!(uow.is_empty());
}

#[tokio::test]
async fn test_commit_without_changes_writes_nothing() {
    let store = Arc::new(RecordingEventStore::new());
    let committer = Committer::new(store.clone(), serializer(), fast_config());
    let mut uow = UnitOfWork::new();
    uow.attach("counter/1".into(), Root::<Counter>::new()).unwrap();

    let outcome = committer.commit(&mut uow, &MetadataScope::new()).await.unwrap();

    assert_eq!(outcome, CommitOutcome::NoChanges);
    assert!(store.appends().is_empty());
}
