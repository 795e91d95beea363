//! Sagas: event-sourced process state driven by consumed events.

use async_trait::async_trait;
use tracing::debug;

use eventweave_commands::CommandBus;
use eventweave_core::command::Command;
use eventweave_core::error::DomainError;
use eventweave_core::event::EventSet;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::MetadataScope;
use eventweave_core::state::State;

use crate::consumer::Consumer;
use crate::contract::SubscriptionContract;
use crate::envelope::EventEnvelope;

/// A long-running process whose progress is stored in its own stream.
///
/// For each consumed event the saga names its instance stream, records the
/// event there with a command against its own state, and then proceeds from
/// the resulting state.
#[async_trait]
pub trait Saga: Send + Sync + 'static {
    /// The events this saga reads.
    type Event: EventSet;
    /// The saga's own state.
    type State: State;
    /// Commands recording progress in the saga state.
    type Command: Command<Self::State>;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// The saga instance stream this event belongs to, if any.
    fn correlate(&self, envelope: &EventEnvelope<Self::Event>) -> Option<AggregateIdentifier>;

    /// The command recording this event in the saga state.
    fn record(&self, envelope: &EventEnvelope<Self::Event>) -> Option<Self::Command>;

    /// Issues follow-up commands from the saga state after recording.
    ///
    /// # Errors
    ///
    /// Any error makes the worker nak the event.
    async fn proceed(
        &self,
        state: &Self::State,
        envelope: &EventEnvelope<Self::Event>,
        bus: &CommandBus,
        metadata: &MetadataScope,
    ) -> Result<(), DomainError>;
}

/// Runs a [`Saga`] as a subscription consumer.
#[derive(Debug)]
pub struct SagaRunner<G> {
    saga: G,
    bus: CommandBus,
}

impl<G: Saga> SagaRunner<G> {
    /// Wraps a saga.
    #[must_use]
    pub fn new(saga: G, bus: CommandBus) -> Self {
        Self { saga, bus }
    }

    /// The wrapped saga.
    #[must_use]
    pub fn saga(&self) -> &G {
        &self.saga
    }
}

#[async_trait]
impl<G: Saga> Consumer for SagaRunner<G> {
    type Event = G::Event;

    fn contract(&self) -> SubscriptionContract {
        self.saga.contract()
    }

    async fn consume(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        let Some(saga_id) = self.saga.correlate(envelope) else {
            debug!(event_type = %envelope.event_type, "event does not belong to a saga instance");
            return Ok(());
        };

        let metadata = envelope.causation_metadata();
        if let Some(command) = self.saga.record(envelope) {
            self.bus
                .execute::<G::State, G::Command>(&saga_id, &command, &metadata)
                .await?;
        }

        let state = self
            .bus
            .load::<G::State>(&saga_id)
            .await?
            .map_or_else(G::State::initial, |root| root.state().clone());
        self.saga.proceed(&state, envelope, &self.bus, &metadata).await
    }
}
