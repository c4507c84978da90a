//! # Shared Types Crate
//!
//! Domain value types shared by the object store, block header state,
//! finality core, finalizer, and aggregating QC crates.
//!
//! ## Design Principles
//!
//! - **Single source of truth**: every cross-crate type is defined here.
//! - **Immutable policies**: `FinalizerPolicy`/`ProposerPolicy` are never
//!   mutated in place; promotion produces a new `Arc` handle.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
