//! Eventweave Subscriptions — persistent subscription workers.
//!
//! A [`SubscriptionWorker`] bootstraps a filtered persistent subscription for
//! one [`Consumer`], then delivers decoded events to it, acknowledging
//! successes and rejecting failures with a retry-then-park policy.
//! Projections, reactions, policies and sagas are the consumer kinds.

pub mod consumer;
pub mod contract;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod projection;
pub mod reaction;
pub mod saga;
pub mod worker;

pub use consumer::Consumer;
pub use contract::{SubscriptionContract, build_filter};
pub use envelope::EventEnvelope;
pub use error::SubscriptionError;
pub use handle::WorkerHandle;
pub use projection::{FoldProjection, Projection};
pub use reaction::{Policy, PolicyRunner, Reaction, Reactor};
pub use saga::{Saga, SagaRunner};
pub use worker::{Bootstrap, SubscriptionWorker, WorkerConfig, WorkerState, nak_action};
