//! Ports layer (hexagonal architecture).
//!
//! Reference: spec.md §4.4, §4.6 (block lifecycle routes each accepted
//! block here after deriving its header state).

pub mod inbound;

pub use inbound::*;
