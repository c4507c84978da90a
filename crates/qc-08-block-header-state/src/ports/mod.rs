//! Ports layer (hexagonal architecture).
//!
//! Reference: spec.md §4.2, §9 "fork database back-edges".

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
