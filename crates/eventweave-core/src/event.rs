//! Domain event abstractions.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::DomainError;
use crate::identifier::AggregateIdentifier;
use crate::registry::EventRegistry;

/// Declared wire identity of an event type.
///
/// The wire name is `[namespace.]name@v{version}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventContract {
    /// Contract name.
    pub name: &'static str,
    /// Contract version.
    pub version: u32,
    /// Optional dotted namespace.
    pub namespace: Option<&'static str>,
}

impl EventContract {
    /// Declares a contract without namespace.
    #[must_use]
    pub const fn new(name: &'static str, version: u32) -> Self {
        Self {
            name,
            version,
            namespace: None,
        }
    }

    /// Places the contract in a namespace.
    #[must_use]
    pub const fn in_namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// The string written as the event type.
    #[must_use]
    pub fn wire_name(&self) -> String {
        match self.namespace {
            Some(namespace) => format!("{namespace}.{}@v{}", self.name, self.version),
            None => format!("{}@v{}", self.name, self.version),
        }
    }
}

impl fmt::Display for EventContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

/// A serializable event payload type.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The declared contract, if this event type has one.
    const CONTRACT: Option<EventContract> = None;

    /// Wire event type: the contract string, or the bare type name.
    #[must_use]
    fn event_type() -> Cow<'static, str> {
        match Self::CONTRACT {
            Some(contract) => Cow::Owned(contract.wire_name()),
            None => Cow::Borrowed(bare_type_name::<Self>()),
        }
    }
}

/// Last path segment of a type name, without generic arguments.
#[must_use]
pub fn bare_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// The closed set of events a state folds, usually an enum over [`Event`] payloads.
pub trait EventSet: Clone + fmt::Debug + Send + Sync + 'static {
    /// Wire event type of this particular event.
    fn event_type(&self) -> Cow<'static, str>;

    /// The event payload as a document, without any enum tagging.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// Registers every wire type that decodes into this set, including
    /// upgradable older versions.
    fn register(registry: &mut EventRegistry<Self>);

    /// Builds a registry for this set.
    #[must_use]
    fn registry() -> EventRegistry<Self> {
        let mut registry = EventRegistry::new();
        Self::register(&mut registry);
        registry
    }
}

/// An event ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// Deterministic event identifier.
    pub event_id: Uuid,
    /// Wire event type.
    pub event_type: String,
    /// Codec content type.
    pub content_type: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
    /// Serialized metadata document.
    pub metadata: Vec<u8>,
}

/// An event as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Stream the event belongs to.
    pub stream: AggregateIdentifier,
    /// Wire event type.
    pub event_type: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
    /// Serialized metadata document.
    pub metadata: Vec<u8>,
    /// Position within the stream, starting at 0.
    pub stream_position: u64,
    /// Position within the whole log.
    pub log_position: u64,
    /// Time the store accepted the event.
    pub created: DateTime<Utc>,
}
