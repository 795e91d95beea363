//! Pluggable payload codec.
//!
//! Payloads and metadata travel through the codec as `serde_json::Value`
//! documents, which keeps the trait object-safe while still letting a binary
//! codec choose its own byte layout.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DomainError;

/// Turns documents into bytes and back.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Content type recorded alongside written events.
    fn content_type(&self) -> &'static str;

    /// Encodes a document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the codec rejects the document.
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, DomainError>;

    /// Decodes a document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the bytes are not valid for this codec.
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, DomainError>;
}

/// Typed helpers on top of any [`Serializer`].
pub trait SerializerExt: Serializer {
    /// Serializes a typed value.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` on failure.
    fn to_bytes<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, DomainError> {
        self.serialize(&serde_json::to_value(value)?)
    }

    /// Deserializes into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` on failure.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DomainError> {
        Ok(serde_json::from_value(self.deserialize(bytes)?)?)
    }
}

impl<S: Serializer + ?Sized> SerializerExt for S {}

/// JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, DomainError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, DomainError> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Deposited {
        amount: u64,
    }

    #[test]
    fn test_json_serializer_typed_helpers() {
        let codec = JsonSerializer;
        let bytes = codec.to_bytes(&Deposited { amount: 10 }).unwrap();
        assert_eq!(bytes, br#"{"amount":10}"#);
        let back: Deposited = codec.decode(&bytes).unwrap();
        assert_eq!(back, Deposited { amount: 10 });
    }

    #[test]
    fn test_empty_bytes_decode_to_null() {
        assert_eq!(JsonSerializer.deserialize(&[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_json_is_a_serialization_error() {
        let err = JsonSerializer.deserialize(b"{nope").unwrap_err();
        assert!(matches!(err, DomainError::Serialization(_)));
    }
}
