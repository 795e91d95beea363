//! Deterministic event identifiers.
//!
//! A retried commit re-sends the same events; deriving the identifier from
//! the write position and content lets the store recognise the duplicates.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::identifier::{AggregateIdentifier, AggregateVersion};

/// Computes the identifier of the event written at `version + offset`.
///
/// The aggregate name, the position, an XXH3 hash of the serialized payload
/// and the wire event type are digested; the first 16 bytes form the UUID.
#[must_use]
pub fn event_id(
    aggregate: &AggregateIdentifier,
    version: AggregateVersion,
    offset: usize,
    payload: &[u8],
    event_type: &str,
) -> Uuid {
    #[allow(clippy::cast_possible_wrap)]
    let position = version.value() + offset as i64;
    let payload_hash = xxhash_rust::xxh3::xxh3_64(payload);

    let mut hasher = Sha256::new();
    write_str(&mut hasher, aggregate.as_str());
    hasher.update(position.to_le_bytes());
    hasher.update(payload_hash.to_le_bytes());
    write_str(&mut hasher, event_type);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn write_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(aggregate: &str, version: i64, offset: usize, payload: &[u8], event_type: &str) -> Uuid {
        event_id(
            &AggregateIdentifier::new(aggregate),
            AggregateVersion::new(version),
            offset,
            payload,
            event_type,
        )
    }

    #[test]
    fn test_same_inputs_give_same_identifier() {
        assert_eq!(
            id("a/1", 3, 1, b"{\"x\":1}", "Bank.Deposited@v1"),
            id("a/1", 3, 1, b"{\"x\":1}", "Bank.Deposited@v1")
        );
    }

    #[test]
    fn test_each_input_changes_identifier() {
        let base = id("a/1", 3, 1, b"{\"x\":1}", "Bank.Deposited@v1");
        assert_ne!(base, id("a/2", 3, 1, b"{\"x\":1}", "Bank.Deposited@v1"));
        assert_ne!(base, id("a/1", 4, 1, b"{\"x\":1}", "Bank.Deposited@v1"));
        assert_ne!(base, id("a/1", 3, 2, b"{\"x\":1}", "Bank.Deposited@v1"));
        assert_ne!(base, id("a/1", 3, 1, b"{\"x\":2}", "Bank.Deposited@v1"));
        assert_ne!(base, id("a/1", 3, 1, b"{\"x\":1}", "Bank.Withdrawn@v1"));
    }

    #[test]
    fn test_offsets_within_one_commit_do_not_collide() {
        let ids: Vec<Uuid> = (0..16).map(|offset| id("a/1", -1, offset, b"{}", "Ping")).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }
}
