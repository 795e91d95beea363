//! State machine abstraction.

use crate::event::EventSet;
use crate::metadata::MetadataScope;

/// An immutable value folded from events.
///
/// `apply` must be total and free of I/O; replay calls it once per stored event.
pub trait State: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The events this state folds.
    type Event: EventSet;

    /// State before any event.
    fn initial() -> Self;

    /// Returns the state after `event`.
    #[must_use]
    fn apply(&self, event: &Self::Event) -> Self;

    /// Lets the state contribute metadata to the events committed from it.
    fn seed_metadata(&self, _metadata: &mut MetadataScope) {}

    /// Folds a sequence of events over `initial()`.
    fn fold<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Self::Event>,
    {
        events
            .into_iter()
            .fold(Self::initial(), |state, event| state.apply(event))
    }
}
