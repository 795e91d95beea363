//! Eventweave Commands — the command handler pipeline.
//!
//! A command travels through three layers, outermost first: the metadata
//! layer opens a child metadata scope and seeds it from the command, the
//! unit-of-work layer opens a commit scope and commits on success, and the
//! router loads or creates the target root and lets it accept the command.

pub mod bus;
pub mod pipeline;
pub mod routing;

pub use bus::CommandBus;
pub use pipeline::{CommandPipeline, MetadataHandler, UnitOfWorkHandler};
pub use routing::{ParseRoutingPolicyError, Router, RoutingPolicy};
