//! Eventweave Core — event-sourcing building blocks.
//!
//! This crate defines states and roots, the command contract, event
//! contracts with their decode/upgrade registry, deterministic event
//! identity, metadata scopes, the unit of work and commit protocol, and the
//! traits of the stream store it is written against. It contains no store
//! implementation.

pub mod aggregate;
pub mod command;
pub mod commit;
pub mod error;
pub mod event;
pub mod identifier;
pub mod identity;
pub mod metadata;
pub mod registry;
pub mod repository;
pub mod serializer;
pub mod state;
pub mod store;
pub mod unit_of_work;
