//! Eventweave Demo — a bank account bounded context.
//!
//! Accounts are opened, credited, debited and closed through commands; a
//! balance projection, a welcome-bonus policy and a withdrawal alert run as
//! subscription workers.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
