//! Projections: consumers that maintain read models.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use eventweave_core::error::DomainError;
use eventweave_core::event::EventSet;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::state::State;

use crate::consumer::Consumer;
use crate::contract::SubscriptionContract;
use crate::envelope::EventEnvelope;

/// A consumer that updates a read model.
#[async_trait]
pub trait Projection: Send + Sync + 'static {
    /// The events this projection reads.
    type Event: EventSet;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// Applies one event to the read model.
    ///
    /// # Errors
    ///
    /// Any error makes the worker nak the event.
    async fn apply(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError>;
}

#[async_trait]
impl<P: Projection> Consumer for P {
    type Event = P::Event;

    fn contract(&self) -> SubscriptionContract {
        Projection::contract(self)
    }

    async fn consume(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        self.apply(envelope).await
    }
}

#[derive(Debug, Clone)]
struct Folded<S> {
    state: S,
    stream_position: u64,
}

/// In-memory projection folding a [`State`] per source stream.
///
/// Redelivered events at or below a stream's last applied position are ignored.
#[derive(Debug)]
pub struct FoldProjection<S: State> {
    contract: SubscriptionContract,
    states: RwLock<HashMap<AggregateIdentifier, Folded<S>>>,
}

impl<S: State> FoldProjection<S> {
    /// Creates an empty projection.
    #[must_use]
    pub fn new(contract: SubscriptionContract) -> Self {
        Self {
            contract,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// The folded state of one stream.
    pub async fn get(&self, stream: &AggregateIdentifier) -> Option<S> {
        self.states
            .read()
            .await
            .get(stream)
            .map(|folded| folded.state.clone())
    }

    /// Number of streams seen.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Returns `true` if no event was applied yet.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl<S: State> Projection for FoldProjection<S> {
    type Event = S::Event;

    fn contract(&self) -> SubscriptionContract {
        self.contract.clone()
    }

    async fn apply(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError> {
        let mut states = self.states.write().await;
        match states.get_mut(&envelope.stream) {
            Some(folded) if envelope.stream_position <= folded.stream_position => {
                debug!(
                    stream = %envelope.stream,
                    position = envelope.stream_position,
                    "already folded, ignoring redelivery"
                );
            }
            Some(folded) => {
                folded.state = folded.state.apply(&envelope.event);
                folded.stream_position = envelope.stream_position;
            }
            None => {
                states.insert(
                    envelope.stream.clone(),
                    Folded {
                        state: S::initial().apply(&envelope.event),
                        stream_position: envelope.stream_position,
                    },
                );
            }
        }
        Ok(())
    }
}
