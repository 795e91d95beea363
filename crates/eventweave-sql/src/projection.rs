//! Projections whose read model lives in SQL tables.

use async_trait::async_trait;
use tracing::debug;

use eventweave_core::error::DomainError;
use eventweave_core::event::EventSet;
use eventweave_subscriptions::{EventEnvelope, Projection, SubscriptionContract};

use crate::executor::{SqlExecutor, StepOutcome};
use crate::statement::SqlBatch;

/// Turns events into SQL statements.
pub trait SqlProjector: Send + Sync + 'static {
    /// The events this projector reads.
    type Event: EventSet;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// Queues the statements for one event. Queuing nothing skips the event.
    ///
    /// # Errors
    ///
    /// Any error makes the worker nak the event.
    fn project(
        &self,
        envelope: &EventEnvelope<Self::Event>,
        batch: &mut SqlBatch,
    ) -> Result<(), DomainError>;
}

/// Runs a [`SqlProjector`] against a [`SqlExecutor`], one transaction per event.
#[derive(Debug)]
pub struct SqlProjection<P, X> {
    projector: P,
    executor: X,
}

impl<P: SqlProjector, X: SqlExecutor> SqlProjection<P, X> {
    /// Creates a new `SqlProjection`.
    #[must_use]
    pub fn new(projector: P, executor: X) -> Self {
        Self {
            projector,
            executor,
        }
    }

    /// The executor statements run on.
    #[must_use]
    pub fn executor(&self) -> &X {
        &self.executor
    }
}

#[async_trait]
impl<P: SqlProjector, X: SqlExecutor> Projection for SqlProjection<P, X> {
    type Event = P::Event;

    fn contract(&self) -> SubscriptionContract {
        self.projector.contract()
    }

    async fn apply(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        let mut batch = SqlBatch::new();
        self.projector.project(envelope, &mut batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        let group = self.projector.contract().qualified_name();
        let outcome = self
            .executor
            .execute_step(&group, envelope.event_id, &batch)
            .await?;
        if outcome == StepOutcome::AlreadyApplied {
            debug!(group = %group, event_id = %envelope.event_id, "skipping redelivered event");
        }
        Ok(())
    }
}
