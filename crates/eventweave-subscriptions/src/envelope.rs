//! Decoded events handed to consumers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::{
    CAUSATION_ID_KEY, CORRELATION_ID_KEY, MetadataScope, Multiplicity, SOURCE_STREAM_KEY,
};

/// A consumed event together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope<E> {
    /// The decoded, fully upgraded event.
    pub event: E,
    /// Identifier of the stored event.
    pub event_id: Uuid,
    /// Wire event type as stored.
    pub event_type: String,
    /// Stream the event belongs to.
    pub stream: AggregateIdentifier,
    /// Position within its stream.
    pub stream_position: u64,
    /// Position within the log.
    pub log_position: u64,
    /// Time the store accepted the event.
    pub created: DateTime<Utc>,
    /// Metadata stored with the event.
    pub metadata: MetadataScope,
}

impl<E> EventEnvelope<E> {
    /// A child of the stored metadata for commands caused by this event.
    ///
    /// The event becomes the causation; the correlation identifier is kept
    /// if the event carries one, otherwise the event starts a new correlation.
    #[must_use]
    pub fn causation_metadata(&self) -> MetadataScope {
        let mut metadata = self.metadata.child();
        let event_id = self.event_id.to_string();
        if metadata.get(CORRELATION_ID_KEY).is_none() {
            metadata.add(CORRELATION_ID_KEY, event_id.clone(), Multiplicity::Single);
        }
        metadata.add(CAUSATION_ID_KEY, event_id, Multiplicity::Single);
        metadata.add(SOURCE_STREAM_KEY, self.stream.as_str(), Multiplicity::Single);
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(metadata: MetadataScope) -> EventEnvelope<()> {
        EventEnvelope {
            event: (),
            event_id: Uuid::nil(),
            event_type: "A@v1".to_owned(),
            stream: "a/1".into(),
            stream_position: 0,
            log_position: 4,
            created: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn test_event_starts_correlation_when_none_is_stored() {
        let metadata = envelope(MetadataScope::new()).causation_metadata();

        let nil = Uuid::nil().to_string();
        assert_eq!(metadata.get_str(CORRELATION_ID_KEY), Some(nil.as_str()));
        assert_eq!(metadata.get_str(CAUSATION_ID_KEY), Some(nil.as_str()));
        assert_eq!(metadata.get_str(SOURCE_STREAM_KEY), Some("a/1"));
    }

    #[test]
    fn test_stored_correlation_is_kept() {
        let stored = MetadataScope::new().with(CORRELATION_ID_KEY, "request-7", Multiplicity::Single);
        let env = envelope(stored);

        let metadata = env.causation_metadata();

        assert_eq!(metadata.get_str(CORRELATION_ID_KEY), Some("request-7"));
        assert!(env.metadata.get(CAUSATION_ID_KEY).is_none());
    }
}
