//! Application layer: consumers driven by subscription workers.

pub mod policies;
pub mod projections;
