//! # qc-08-block-header-state — block header derivation & finality core
//!
//! Components B and C of the Savanna finality engine (spec.md §2): given
//! a parent `BlockHeaderState` and the inputs for one new block, derive
//! the child state — advancing the finality core's 2-chain, promoting
//! proposer and finalizer policies through their proposed/pending/active
//! stages, and computing the base and finality digests.
//!
//! ## Crate layout
//!
//! - [`domain::finality_core`] — the 2-chain bookkeeping (`FinalityCore`,
//!   `core.next`).
//! - [`domain::policy`] — proposer and finalizer policy diffs and the
//!   queue promotion rules (§4.2.1, §4.2.2).
//! - [`domain::header`] — the assembled `BlockHeader` and
//!   `finality_extension`.
//! - [`domain::digest`] — `base_digest` / `finality_digest` (§4.2.3).
//! - [`domain::state`] — `BlockHeaderState` and its `next()` derivation,
//!   plus incoming-header validation (§4.2.4).
//! - [`service`] — the default `BlockHeaderStateApi` implementation.
//!
//! ## Non-goals carried over from spec.md §1
//!
//! WASM execution, transaction authorization, resource metering, RPC
//! surfaces, and genesis bootstrapping are all external collaborators;
//! this crate only derives and validates header state.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{BlockHeader, BlockHeaderState, FinalityCore, FinalityExtension, HeaderInput};
pub use error::{CoreError, CoreResult};
pub use ports::{BlockAtHeight, BlockHeaderStateApi, NoHistoricalPolicies};
pub use service::BlockHeaderStateService;
