//! The seam between subscription workers and the code they drive.

use async_trait::async_trait;

use eventweave_core::error::DomainError;
use eventweave_core::event::EventSet;
use eventweave_core::registry::EventRegistry;

use crate::contract::SubscriptionContract;
use crate::envelope::EventEnvelope;

/// Anything a subscription worker can dispatch events to.
///
/// Projections implement it through [`crate::projection::Projection`];
/// reactions, sagas and policies through their runner types.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    /// The events this consumer reads.
    type Event: EventSet;

    /// Identity of the persistent subscription.
    fn contract(&self) -> SubscriptionContract;

    /// Wire types this consumer decodes, and the contracts its filter is built from.
    fn registry(&self) -> EventRegistry<Self::Event> {
        Self::Event::registry()
    }

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error makes the worker nak the event.
    async fn consume(&self, envelope: &EventEnvelope<Self::Event>) -> Result<(), DomainError>;
}
