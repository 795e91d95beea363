//! Startup-time registry from wire event types to decoders.
//!
//! Every wire type a consumer or state can read is registered explicitly.
//! An entry either finishes into the target event set or declares an upgrade
//! to a newer payload type; decoding walks upgrades until it reaches an entry
//! that finishes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DomainError;
use crate::event::{Event, EventContract};
use crate::serializer::{Serializer, SerializerExt};

type AnyPayload = Box<dyn Any + Send>;
type DecodeFn = Arc<dyn Fn(&dyn Serializer, &[u8]) -> Result<AnyPayload, DomainError> + Send + Sync>;
type UpgradeFn = Arc<dyn Fn(AnyPayload) -> Result<AnyPayload, DomainError> + Send + Sync>;
type FinishFn<E> = Arc<dyn Fn(AnyPayload) -> Result<E, DomainError> + Send + Sync>;

enum Resolution<E> {
    Finish(FinishFn<E>),
    Upgrade { to: String, upgrade: UpgradeFn },
}

impl<E> Clone for Resolution<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Finish(finish) => Self::Finish(Arc::clone(finish)),
            Self::Upgrade { to, upgrade } => Self::Upgrade {
                to: to.clone(),
                upgrade: Arc::clone(upgrade),
            },
        }
    }
}

struct Entry<E> {
    contract: Option<EventContract>,
    decode: DecodeFn,
    resolution: Resolution<E>,
}

impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            contract: self.contract,
            decode: Arc::clone(&self.decode),
            resolution: self.resolution.clone(),
        }
    }
}

/// Maps wire event types onto decoders producing `E`.
pub struct EventRegistry<E> {
    order: Vec<String>,
    entries: HashMap<String, Entry<E>>,
}

impl<E> Clone for EventRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<E> std::fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.order)
            .finish_non_exhaustive()
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, event_type: String, entry: Entry<E>) {
        if self.entries.insert(event_type.clone(), entry).is_none() {
            self.order.push(event_type);
        }
    }

    /// Returns `true` if the wire type is known.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.entries.contains_key(event_type)
    }

    /// Number of registered wire types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered wire types, in registration order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Contracts of every registered type that declares one, in registration order.
    pub fn contracts(&self) -> impl Iterator<Item = EventContract> + '_ {
        self.order
            .iter()
            .filter_map(|event_type| self.entries.get(event_type))
            .filter_map(|entry| entry.contract)
    }

    /// The wire type a registered type upgrades to, if any.
    #[must_use]
    pub fn upgrade_target(&self, event_type: &str) -> Option<&str> {
        match &self.entries.get(event_type)?.resolution {
            Resolution::Upgrade { to, .. } => Some(to.as_str()),
            Resolution::Finish(_) => None,
        }
    }

    /// Decodes a payload, applying every declared upgrade on the way.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if the wire type, or a type on
    /// its upgrade chain, is not registered, and `DomainError::Serialization`
    /// if the payload does not decode.
    pub fn decode(
        &self,
        event_type: &str,
        payload: &[u8],
        serializer: &dyn Serializer,
    ) -> Result<E, DomainError> {
        let mut entry = self
            .entries
            .get(event_type)
            .ok_or_else(|| DomainError::UnknownEventType(event_type.to_owned()))?;
        let mut value = (entry.decode)(serializer, payload)?;
        let mut hops = 0;
        loop {
            match &entry.resolution {
                Resolution::Finish(finish) => return finish(value),
                Resolution::Upgrade { to, upgrade } => {
                    hops += 1;
                    if hops > self.entries.len() {
                        return Err(DomainError::Validation(format!(
                            "upgrade chain starting at {event_type} does not terminate"
                        )));
                    }
                    value = upgrade(value)?;
                    entry = self
                        .entries
                        .get(to)
                        .ok_or_else(|| DomainError::UnknownEventType(to.clone()))?;
                }
            }
        }
    }
}

impl<E: Send + 'static> EventRegistry<E> {
    /// Registers `T` as a current payload type of `E`.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Event + Into<E>,
    {
        let finish: FinishFn<E> = Arc::new(|value| Ok(downcast::<T>(value)?.into()));
        self.insert(
            T::event_type().into_owned(),
            Entry {
                contract: T::CONTRACT,
                decode: decoder::<T>(),
                resolution: Resolution::Finish(finish),
            },
        );
        self
    }

    /// Registers `Old` as a retired payload type that upgrades into `New`.
    ///
    /// `New` must be registered too, either as a current type or with its own upgrade.
    pub fn register_upgrade<Old, New>(&mut self) -> &mut Self
    where
        Old: Event,
        New: Event + From<Old>,
    {
        let upgrade: UpgradeFn = Arc::new(|value| {
            let old = downcast::<Old>(value)?;
            Ok(Box::new(New::from(old)) as AnyPayload)
        });
        self.insert(
            Old::event_type().into_owned(),
            Entry {
                contract: Old::CONTRACT,
                decode: decoder::<Old>(),
                resolution: Resolution::Upgrade {
                    to: New::event_type().into_owned(),
                    upgrade,
                },
            },
        );
        self
    }
}

fn decoder<T: Event>() -> DecodeFn {
    Arc::new(|serializer, bytes| {
        let value: T = serializer.decode(bytes)?;
        Ok(Box::new(value) as AnyPayload)
    })
}

fn downcast<T: 'static>(value: AnyPayload) -> Result<T, DomainError> {
    value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        DomainError::Serialization(format!(
            "decoded payload is not a {}",
            std::any::type_name::<T>()
        ))
    })
}
