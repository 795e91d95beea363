//! Tests for `SqlProjection` and `PgSqlExecutor`.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use eventweave_core::error::DomainError;
use eventweave_core::metadata::MetadataScope;
use eventweave_sql::{
    PgSqlExecutor, SqlBatch, SqlExecutor, SqlProjection, SqlProjectionError, SqlProjector,
    SqlStatement, StepOutcome,
};
use eventweave_subscriptions::{EventEnvelope, Projection, SubscriptionContract};
use eventweave_test_support::{CounterEvent, Incremented, Opened};

/// Projects counters into a `counters` table.
struct Counters;

impl SqlProjector for Counters {
    type Event = CounterEvent;

    fn contract(&self) -> SubscriptionContract {
        SubscriptionContract::new("Counters", 1).in_namespace("Sql")
    }

    fn project(
        &self,
        envelope: &EventEnvelope<CounterEvent>,
        batch: &mut SqlBatch,
    ) -> Result<(), DomainError> {
        match &envelope.event {
            CounterEvent::Opened(opened) => batch.push(
                SqlStatement::text(
                    "INSERT INTO account_balances (account_id, owner) VALUES (@id, @owner)",
                )
                .bind("id", envelope.stream.as_str())
                .bind("owner", opened.owner.as_str()),
            ),
            CounterEvent::Incremented(Incremented { by: 0 }) => {}
            CounterEvent::Incremented(incremented) => batch.push(
                SqlStatement::text(
                    "UPDATE account_balances SET balance = balance + @by WHERE account_id = @id",
                )
                .bind("id", envelope.stream.as_str())
                .bind("by", incremented.by),
            ),
        }
        Ok(())
    }
}

/// Records steps instead of running them.
#[derive(Default)]
struct RecordingExecutor {
    steps: Mutex<Vec<(String, Uuid, SqlBatch)>>,
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn execute_step(
        &self,
        group: &str,
        event_id: Uuid,
        batch: &SqlBatch,
    ) -> Result<StepOutcome, SqlProjectionError> {
        batch.prepare()?;
        let mut steps = self.steps.lock().unwrap();
        if steps.iter().any(|(g, id, _)| g == group && *id == event_id) {
            return Ok(StepOutcome::AlreadyApplied);
        }
        steps.push((group.to_owned(), event_id, batch.clone()));
        Ok(StepOutcome::Applied {
            rows_affected: batch.len() as u64,
        })
    }
}

fn envelope(event: CounterEvent, stream_position: u64) -> EventEnvelope<CounterEvent> {
    EventEnvelope {
        event,
        event_id: Uuid::new_v4(),
        event_type: "Tests.Counter.Opened@v1".to_owned(),
        stream: "acc-1".into(),
        stream_position,
        log_position: stream_position,
        created: Utc::now(),
        metadata: MetadataScope::new(),
    }
}

// --- SqlProjection ---

#[tokio::test]
async fn test_event_runs_as_one_step_under_the_group_name() {
    // Arrange
    let projection = SqlProjection::new(Counters, RecordingExecutor::default());
    let opened = envelope(CounterEvent::Opened(Opened { owner: "ann".into() }), 0);

    // Act
    projection.apply(&opened).await.unwrap();

    // Assert
    let steps = projection.executor().steps.lock().unwrap();
    assert_eq!(steps.len(), 1);
    let (group, event_id, batch) = &steps[0];
    assert_eq!(group, "Sql.Counters@v1");
    assert_eq!(*event_id, opened.event_id);
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn test_empty_batch_skips_executor() {
    let projection = SqlProjection::new(Counters, RecordingExecutor::default());

    projection
        .apply(&envelope(CounterEvent::Incremented(Incremented { by: 0 }), 1))
        .await
        .unwrap();

    assert!(projection.executor().steps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_redelivered_event_is_not_applied_twice() {
    let projection = SqlProjection::new(Counters, RecordingExecutor::default());
    let incremented = envelope(CounterEvent::Incremented(Incremented { by: 3 }), 1);

    projection.apply(&incremented).await.unwrap();
    projection.apply(&incremented).await.unwrap();

    assert_eq!(projection.executor().steps.lock().unwrap().len(), 1);
}

/// Queues a statement with a parameter it never binds.
struct Broken;

impl SqlProjector for Broken {
    type Event = CounterEvent;

    fn contract(&self) -> SubscriptionContract {
        SubscriptionContract::new("Broken", 1)
    }

    fn project(
        &self,
        _envelope: &EventEnvelope<CounterEvent>,
        batch: &mut SqlBatch,
    ) -> Result<(), DomainError> {
        batch.push(SqlStatement::text("DELETE FROM account_balances WHERE account_id = @id"));
        Ok(())
    }
}

#[tokio::test]
async fn test_unbound_parameter_fails_the_event() {
    let projection = SqlProjection::new(Broken, RecordingExecutor::default());

    let err = projection
        .apply(&envelope(CounterEvent::Opened(Opened { owner: "ann".into() }), 0))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Validation(message) if message.contains("@id")));
}

// --- PgSqlExecutor ---

async fn balance(pool: &PgPool, account: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT balance FROM account_balances WHERE account_id = $1")
        .bind(account)
        .fetch_optional(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_step_commits_every_statement(pool: PgPool) {
    // Arrange
    let executor = PgSqlExecutor::new(pool.clone());
    let mut batch = SqlBatch::new();
    batch.push(
        SqlStatement::text("INSERT INTO account_balances (account_id, owner) VALUES (@id, @owner)")
            .bind("id", "acc-1")
            .bind("owner", "ann"),
    );
    batch.push(
        SqlStatement::text("UPDATE account_balances SET balance = balance + @by WHERE account_id = @id")
            .bind("id", "acc-1")
            .bind("by", 25_i64),
    );

    // Act
    let outcome = executor
        .execute_step("Sql.Counters@v1", Uuid::new_v4(), &batch)
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome, StepOutcome::Applied { rows_affected: 2 });
    assert_eq!(balance(&pool, "acc-1").await, Some(25));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_failing_statement_rolls_back_the_whole_step(pool: PgPool) {
    // Arrange
    let executor = PgSqlExecutor::new(pool.clone());
    let event_id = Uuid::new_v4();
    let mut batch = SqlBatch::new();
    batch.push(
        SqlStatement::text("INSERT INTO account_balances (account_id) VALUES (@id)")
            .bind("id", "acc-2"),
    );
    batch.push(SqlStatement::text("INSERT INTO missing_table VALUES (1)"));

    // Act
    let result = executor.execute_step("Sql.Counters@v1", event_id, &batch).await;

    // Assert
    assert!(matches!(result, Err(SqlProjectionError::Database(_))));
    assert_eq!(balance(&pool, "acc-2").await, None);
    let recorded: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM eventweave_projection_steps WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(recorded, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_same_event_is_applied_once(pool: PgPool) {
    let executor = PgSqlExecutor::new(pool.clone());
    let event_id = Uuid::new_v4();
    let mut batch = SqlBatch::new();
    batch.push(
        SqlStatement::text("INSERT INTO account_balances (account_id) VALUES (@id)").bind("id", "acc-3"),
    );

    let first = executor.execute_step("g", event_id, &batch).await.unwrap();
    let second = executor.execute_step("g", event_id, &batch).await.unwrap();

    assert_eq!(first, StepOutcome::Applied { rows_affected: 1 });
    assert_eq!(second, StepOutcome::AlreadyApplied);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_ensure_schema_is_idempotent(pool: PgPool) {
    let executor = PgSqlExecutor::new(pool);

    executor.ensure_schema().await.unwrap();
    executor.ensure_schema().await.unwrap();
}
