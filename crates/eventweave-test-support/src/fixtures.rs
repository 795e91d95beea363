//! A small counter aggregate used across test suites.

use std::borrow::Cow;

use async_trait::async_trait;
use eventweave_core::command::{Command, CommandKind, EventSink};
use eventweave_core::error::DomainError;
use eventweave_core::event::{Event, EventContract, EventSet};
use eventweave_core::metadata::{MetadataScope, Multiplicity};
use eventweave_core::registry::EventRegistry;
use eventweave_core::state::State;
use serde::{Deserialize, Serialize};

/// The counter was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opened {
    pub owner: String,
}

impl Event for Opened {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("Opened", 1).in_namespace("Tests.Counter"));
}

/// The counter was incremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incremented {
    pub by: u32,
}

impl Event for Incremented {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("Incremented", 1).in_namespace("Tests.Counter"));
}

/// Events of [`Counter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    Opened(Opened),
    Incremented(Incremented),
}

impl From<Opened> for CounterEvent {
    fn from(value: Opened) -> Self {
        Self::Opened(value)
    }
}

impl From<Incremented> for CounterEvent {
    fn from(value: Incremented) -> Self {
        Self::Incremented(value)
    }
}

impl EventSet for CounterEvent {
    fn event_type(&self) -> Cow<'static, str> {
        match self {
            Self::Opened(_) => Opened::event_type(),
            Self::Incremented(_) => Incremented::event_type(),
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        Ok(match self {
            Self::Opened(e) => serde_json::to_value(e)?,
            Self::Incremented(e) => serde_json::to_value(e)?,
        })
    }

    fn register(registry: &mut EventRegistry<Self>) {
        registry.register::<Opened>().register::<Incremented>();
    }
}

/// Counter state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    pub owner: Option<String>,
    pub value: u32,
}

impl State for Counter {
    type Event = CounterEvent;

    fn initial() -> Self {
        Self::default()
    }

    fn apply(&self, event: &Self::Event) -> Self {
        match event {
            CounterEvent::Opened(e) => Self {
                owner: Some(e.owner.clone()),
                ..self.clone()
            },
            CounterEvent::Incremented(e) => Self {
                value: self.value + e.by,
                ..self.clone()
            },
        }
    }
}

/// Opens a counter; a creation command.
#[derive(Debug, Clone)]
pub struct Open {
    pub owner: String,
}

#[async_trait]
impl Command<Counter> for Open {
    const KIND: CommandKind = CommandKind::Create;

    fn command_type(&self) -> &'static str {
        "counter.open"
    }

    async fn execute(&self, sink: &mut EventSink<Counter>) -> Result<(), DomainError> {
        if sink.state().owner.is_some() {
            return Err(DomainError::Validation("counter already open".into()));
        }
        sink.emit(Opened {
            owner: self.owner.clone(),
        });
        Ok(())
    }
}

/// Emits `times` increments of `by`.
#[derive(Debug, Clone)]
pub struct Increment {
    pub by: u32,
    pub times: usize,
}

#[async_trait]
impl Command<Counter> for Increment {
    fn command_type(&self) -> &'static str {
        "counter.increment"
    }

    fn seed_metadata(&self, metadata: &mut MetadataScope) {
        metadata.add("increment_by", self.by, Multiplicity::Single);
    }

    async fn execute(&self, sink: &mut EventSink<Counter>) -> Result<(), DomainError> {
        for _ in 0..self.times {
            sink.emit(Incremented { by: self.by });
        }
        Ok(())
    }
}

/// Always rejected.
#[derive(Debug, Clone)]
pub struct Fail;

#[async_trait]
impl Command<Counter> for Fail {
    fn command_type(&self) -> &'static str {
        "counter.fail"
    }

    async fn execute(&self, _sink: &mut EventSink<Counter>) -> Result<(), DomainError> {
        Err(DomainError::Validation("rejected".into()))
    }
}
