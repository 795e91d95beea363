//! Command abstractions.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::metadata::MetadataScope;
use crate::state::State;

/// Whether a command creates its aggregate or modifies an existing one.
///
/// Only consulted by the marker routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// The aggregate must not exist yet.
    Create,
    /// The aggregate must already exist.
    #[default]
    Modify,
}

/// Receives the events a command produces.
///
/// Every emitted event is folded right away, so [`EventSink::state`] always
/// reflects the events emitted so far.
#[derive(Debug)]
pub struct EventSink<S: State> {
    state: S,
    events: Vec<S::Event>,
}

impl<S: State> EventSink<S> {
    /// Starts a sink on top of `state`.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state,
            events: Vec::new(),
        }
    }

    /// The current folded state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Applies and records an event.
    pub fn emit(&mut self, event: impl Into<S::Event>) {
        let event = event.into();
        self.state = self.state.apply(&event);
        self.events.push(event);
    }

    /// Events emitted so far.
    #[must_use]
    pub fn events(&self) -> &[S::Event] {
        &self.events
    }

    /// Consumes the sink.
    #[must_use]
    pub fn into_parts(self) -> (S, Vec<S::Event>) {
        (self.state, self.events)
    }
}

/// A request to change one aggregate of state `S`.
#[async_trait]
pub trait Command<S: State>: Send + Sync + std::fmt::Debug {
    /// Routing tag used by the marker policy.
    const KIND: CommandKind = CommandKind::Modify;

    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Adds command-level metadata to the events this command produces.
    fn seed_metadata(&self, _metadata: &mut MetadataScope) {}

    /// Emits zero or more events against the current state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` to reject the command; nothing emitted is kept.
    async fn execute(&self, sink: &mut EventSink<S>) -> Result<(), DomainError>;
}
