//! # node-runtime — Savanna finality node orchestrator
//!
//! Thin binary crate wiring the four Savanna components (spec.md §2)
//! together behind one [`controller::SavannaController`]: the object
//! store (`qc-02-object-store`), block header derivation and finality
//! core (`qc-08-block-header-state`), finalizer vote decision
//! (`qc-09-finality`), and aggregating QC (`qc-10-aggregating-qc`).
//!
//! ## Non-goals carried over from spec.md §1
//!
//! WASM execution, transaction authorization, RPC/websocket surfaces,
//! peer discovery, and CLI tooling are all external collaborators this
//! crate does not implement; it owns only configuration loading and the
//! controller wiring.

pub mod config;
pub mod controller;

pub use config::SavannaConfig;
pub use controller::SavannaController;
