//! Ports layer (hexagonal architecture).
//!
//! Reference: spec.md §4.6 (votes and received QCs arrive here from the
//! network; the node runtime also calls in after forming its own votes).

pub mod inbound;

pub use inbound::*;
