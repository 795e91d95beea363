//! Reactions and policies: consumers that turn events into commands.

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

/// Free-form reaction to events, dispatching commands through a bus.
#[async_trait]
pub trait Reaction: Send + Sync + 'static {
    /// The events this reaction reads.
    type Event: EventSet;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// Reacts to one event.
    ///
    /// `metadata` already carries correlation and causation of the event;
    /// pass it to every dispatched command.
    ///
    /// # Errors
    ///
    /// Any error makes the worker nak the event.
    async fn react(
        &self,
        envelope: &EventEnvelope<Self::Event>,
        bus: &CommandBus,
        metadata: &MetadataScope,
    ) -> Result<(), DomainError>;
}

/// Runs a [`Reaction`] as a subscription consumer.
#[derive(Debug)]
pub struct Reactor<R> {
    reaction: R,
    bus: CommandBus,
}

impl<R: Reaction> Reactor<R> {
    /// Wraps a reaction.
    #[must_use]
    pub fn new(reaction: R, bus: CommandBus) -> Self {
        Self { reaction, bus }
    }

    /// The wrapped reaction.
    #[must_use]
    pub fn reaction(&self) -> &R {
        &self.reaction
    }
}

#[async_trait]
impl<R: Reaction> Consumer for Reactor<R> {
    type Event = R::Event;

    fn contract(&self) -> SubscriptionContract {
        self.reaction.contract()
    }

    async fn consume(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        let metadata = envelope.causation_metadata();
        self.reaction.react(envelope, &self.bus, &metadata).await
    }
}

/// A stateless decision mapping one event to commands for one state type.
pub trait Policy: Send + Sync + 'static {
    /// The events this policy reads.
    type Event: EventSet;
    /// State of the aggregates the policy commands.
    type State: State;
    /// The commands it issues.
    type Command: Command<Self::State>;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// The commands to issue, each with its target aggregate.
    fn decide(
        &self,
        envelope: &EventEnvelope<Self::Event>,
    ) -> Vec<(AggregateIdentifier, Self::Command)>;
}

/// Runs a [`Policy`] as a subscription consumer.
#[derive(Debug)]
pub struct PolicyRunner<P> {
    policy: P,
    bus: CommandBus,
}

impl<P: Policy> PolicyRunner<P> {
    /// Wraps a policy.
    #[must_use]
    pub fn new(policy: P, bus: CommandBus) -> Self {
        Self { policy, bus }
    }
}

#[async_trait]
impl<P: Policy> Consumer for PolicyRunner<P> {
    type Event = P::Event;

    fn contract(&self) -> SubscriptionContract {
        self.policy.contract()
    }

    async fn consume(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        let commands = self.policy.decide(envelope);
        if commands.is_empty() {
            return Ok(());
        }
        let metadata = envelope.causation_metadata();
        for (id, command) in &commands {
            debug!(aggregate = %id, command = command.command_type(), "policy dispatching");
            self.bus
                .execute::<P::State, P::Command>(id, command, &metadata)
                .await?;
        }
        Ok(())
    }
}
