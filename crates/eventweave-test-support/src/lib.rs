//! Shared test mocks and fixtures for Eventweave.

mod fixtures;
mod store;

pub use fixtures::{Counter, CounterEvent, Fail, Increment, Incremented, Open, Opened};
pub use store::{
    FailingEventStore, FlakyEventStore, RecordingEventStore, RecordingSubscriptionStore,
};
