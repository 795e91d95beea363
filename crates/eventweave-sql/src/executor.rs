//! Transactional execution of SQL batches.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SqlProjectionError;
use crate::schema::{CREATE_PROJECTION_STEPS_TABLE, INSERT_PROJECTION_STEP};
use crate::statement::{PreparedStatement, SqlBatch, SqlParam};

/// What happened to one projected event's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The batch ran and committed.
    Applied {
        /// Rows affected across all statements.
        rows_affected: u64,
    },
    /// The event was applied by an earlier delivery; nothing ran.
    AlreadyApplied,
}

/// Runs one projection step's batch atomically.
#[async_trait]
pub trait SqlExecutor: Send + Sync + 'static {
    /// Executes `batch` for `event_id` as seen by subscription `group`.
    ///
    /// # Errors
    ///
    /// Returns `SqlProjectionError` if preparation or any statement fails;
    /// nothing of the batch is kept in that case.
    async fn execute_step(
        &self,
        group: &str,
        event_id: Uuid,
        batch: &SqlBatch,
    ) -> Result<StepOutcome, SqlProjectionError>;
}

/// `PostgreSQL`-backed executor; one transaction per step.
#[derive(Debug, Clone)]
pub struct PgSqlExecutor {
    pool: PgPool,
}

impl PgSqlExecutor {
    /// Creates a new `PgSqlExecutor`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the projection step table if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `SqlProjectionError::Database` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), SqlProjectionError> {
        sqlx::raw_sql(CREATE_PROJECTION_STEPS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Runs a batch in one transaction without step bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns `SqlProjectionError` on failure, after rolling back.
    pub async fn execute(&self, batch: &SqlBatch) -> Result<u64, SqlProjectionError> {
        let prepared = batch.prepare()?;
        let mut tx = self.pool.begin().await?;
        match run(&mut tx, &prepared).await {
            Ok(rows_affected) => {
                tx.commit().await?;
                Ok(rows_affected)
            }
            Err(err) => {
                warn!(error = %err, statements = prepared.len(), "SQL batch failed, rolling back");
                after_rollback(Err(err), tx.rollback().await)
            }
        }
    }
}

#[async_trait]
impl SqlExecutor for PgSqlExecutor {
    async fn execute_step(
        &self,
        group: &str,
        event_id: Uuid,
        batch: &SqlBatch,
    ) -> Result<StepOutcome, SqlProjectionError> {
        let prepared = batch.prepare()?;
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(INSERT_PROJECTION_STEP)
            .bind(group)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        if recorded.rows_affected() == 0 {
            debug!(group, event_id = %event_id, "projection step already applied");
            return after_rollback(Ok(StepOutcome::AlreadyApplied), tx.rollback().await);
        }

        match run(&mut tx, &prepared).await {
            Ok(rows_affected) => {
                tx.commit().await?;
                debug!(group, event_id = %event_id, rows_affected, "projection step applied");
                Ok(StepOutcome::Applied { rows_affected })
            }
            Err(err) => {
                warn!(group, event_id = %event_id, error = %err, "projection step failed, rolling back");
                after_rollback(Err(err), tx.rollback().await)
            }
        }
    }
}

/// Keeps `outcome` whatever the rollback did; a failed rollback is only logged.
fn after_rollback<T>(
    outcome: Result<T, SqlProjectionError>,
    rollback: Result<(), sqlx::Error>,
) -> Result<T, SqlProjectionError> {
    if let Err(err) = rollback {
        warn!(error = %err, "rollback failed");
    }
    outcome
}

async fn run(
    conn: &mut PgConnection,
    statements: &[PreparedStatement],
) -> Result<u64, SqlProjectionError> {
    let mut rows_affected = 0;
    for statement in statements {
        let query = statement
            .params
            .iter()
            .fold(sqlx::query(&statement.sql), bind);
        rows_affected += query.execute(&mut *conn).await?.rows_affected();
    }
    Ok(rows_affected)
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Bool(value) => query.bind(*value),
        SqlParam::Int(value) => query.bind(*value),
        SqlParam::Float(value) => query.bind(*value),
        SqlParam::Text(value) => query.bind(value.clone()),
        SqlParam::Uuid(value) => query.bind(*value),
        SqlParam::Timestamp(value) => query.bind(*value),
        SqlParam::Json(value) => query.bind(value.clone().map(sqlx::types::Json)),
    }
}
