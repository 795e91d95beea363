//! Metadata scopes.
//!
//! A [`MetadataScope`] is an explicit context value handed down every call
//! path that may enrich the metadata of written events. Entering a nested
//! execution creates a child with [`MetadataScope::child`], which starts from
//! a copy of the parent's entries; changes made to the child never leak back
//! into the parent.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::serializer::Serializer;

/// Command type that produced the events.
pub const COMMAND_KEY: &str = "$command";
/// Correlation identifier shared by everything one request caused.
pub const CORRELATION_ID_KEY: &str = "$correlation_id";
/// Identifier of the event that caused the command.
pub const CAUSATION_ID_KEY: &str = "$causation_id";
/// Stream the consumed event was read from.
pub const SOURCE_STREAM_KEY: &str = "$source_stream";

/// How a write combines with an existing value for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiplicity {
    /// Last write wins.
    #[default]
    Single,
    /// Values accumulate into an ordered array.
    Multiple,
}

/// Key/value context captured into written-event metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataScope {
    entries: BTreeMap<String, Value>,
}

impl MetadataScope {
    /// A fresh scope with no entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope that inherits every entry of this one.
    #[must_use]
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Adds an entry.
    ///
    /// With [`Multiplicity::Single`] the value replaces whatever was stored.
    /// With [`Multiplicity::Multiple`] a missing key stores the scalar, an
    /// existing scalar is promoted to `[old, new]`, and an existing array
    /// gets the value appended.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>, multiplicity: Multiplicity) {
        let key = key.into();
        let value = value.into();
        match multiplicity {
            Multiplicity::Single => {
                self.entries.insert(key, value);
            }
            Multiplicity::Multiple => match self.entries.remove(&key) {
                None => {
                    self.entries.insert(key, value);
                }
                Some(Value::Array(mut values)) => {
                    values.push(value);
                    self.entries.insert(key, Value::Array(values));
                }
                Some(existing) => {
                    self.entries.insert(key, Value::Array(vec![existing, value]));
                }
            },
        }
    }

    /// Builder form of [`MetadataScope::add`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>, multiplicity: Multiplicity) -> Self {
        self.add(key, value, multiplicity);
        self
    }

    /// Returns the value stored for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value stored for a key if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The scope as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<_, _>>(),
        )
    }

    /// Encodes the scope for storage next to an event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the codec fails.
    pub fn to_bytes(&self, serializer: &dyn Serializer) -> Result<Vec<u8>, DomainError> {
        serializer.serialize(&self.to_value())
    }

    /// Rebuilds a scope from stored event metadata. Empty metadata yields an empty scope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the bytes do not hold an object.
    pub fn from_bytes(bytes: &[u8], serializer: &dyn Serializer) -> Result<Self, DomainError> {
        match serializer.deserialize(bytes)? {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => Err(DomainError::Serialization(format!(
                "event metadata must be an object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use serde_json::json;

    #[test]
    fn test_multiple_accumulates_in_insertion_order_then_single_collapses() {
        // Arrange
        let mut scope = MetadataScope::new();

        // Act
        scope.add("tag", "a", Multiplicity::Multiple);
        scope.add("tag", "b", Multiplicity::Multiple);
        scope.add("tag", "c", Multiplicity::Multiple);

        // Assert
        assert_eq!(scope.get("tag"), Some(&json!(["a", "b", "c"])));

        scope.add("tag", "d", Multiplicity::Single);
        assert_eq!(scope.get("tag"), Some(&json!("d")));
    }

    #[test]
    fn test_single_overwrites() {
        let scope = MetadataScope::new()
            .with("user", "ada", Multiplicity::Single)
            .with("user", "grace", Multiplicity::Single);
        assert_eq!(scope.get_str("user"), Some("grace"));
    }

    #[test]
    fn test_child_inherits_without_leaking_back() {
        // Arrange
        let parent = MetadataScope::new().with("tenant", "north", Multiplicity::Single);

        // Act
        let mut child = parent.child();
        child.add("tenant", "south", Multiplicity::Multiple);
        child.add("request", 7, Multiplicity::Single);

        // Assert
        assert_eq!(child.get("tenant"), Some(&json!(["north", "south"])));
        assert_eq!(child.get("request"), Some(&json!(7)));
        assert_eq!(parent.get_str("tenant"), Some("north"));
        assert!(parent.get("request").is_none());
    }

    #[test]
    fn test_bytes_round_trip_and_empty_metadata() {
        let scope = MetadataScope::new().with(COMMAND_KEY, "Open", Multiplicity::Single);
        let bytes = scope.to_bytes(&JsonSerializer).unwrap();
        assert_eq!(MetadataScope::from_bytes(&bytes, &JsonSerializer).unwrap(), scope);
        assert!(MetadataScope::from_bytes(&[], &JsonSerializer).unwrap().is_empty());
    }

    #[test]
    fn test_non_object_metadata_is_rejected() {
        let err = MetadataScope::from_bytes(b"[1,2]", &JsonSerializer).unwrap_err();
        assert!(matches!(err, DomainError::Serialization(_)));
    }
}
