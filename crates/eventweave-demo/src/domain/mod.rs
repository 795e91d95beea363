//! Domain layer for the bank account context.

pub mod aggregates;
pub mod commands;
pub mod events;
