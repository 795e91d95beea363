//! Eventweave Store — in-memory stream store.
//!
//! A single-process implementation of the stream store traits: ordered
//! streams with optimistic appends and idempotent event identifiers, plus
//! filtered persistent subscriptions with ack, nak and parking. Used by tests
//! and the demo binary.

pub mod memory_store;
mod subscription;

pub use memory_store::MemoryEventStore;
