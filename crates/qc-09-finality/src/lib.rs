//! # qc-09-finality — finalizer vote decision & safety-info persistence
//!
//! Component D of the Savanna finality engine (spec.md §2): the per-
//! finalizer safety/liveness rules that decide whether to cast a strong
//! vote, weak vote, or no vote on a block, and the on-disk persistence of
//! finalizer safety information that survives restarts.
//!
//! ## Crate layout
//!
//! - [`domain::decision`] — the 8-step vote decision (`decide_vote`) and
//!   the crash-recovery `maybe_update_fsi` path.
//! - [`domain::fsi_store`] — the FSI file format (v0/v1, CRC32, inactive-
//!   finalizer caching).
//! - [`domain::finalizer_set`] — `FinalizerSet`, the `my_finalizers`
//!   aggregate that runs every configured key's decision and batches the
//!   resulting writes.
//! - [`service`] — the default `FinalizerVoteApi` implementation.
//!
//! This crate takes no dependency on `qc-08-block-header-state`; callers
//! compute each `VoteInput`'s `extends_lock`/`extends_last_vote` fields via
//! the finality core's `extends()` before calling in (see
//! [`domain::decision`]'s module doc).

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{decide_vote, maybe_update_fsi, CastVote, FinalizerSet, QcObservation, VoteInput, VoteResult};
pub use error::{FinalityError, FinalityResult};
pub use ports::FinalizerVoteApi;
pub use service::FinalizerVoteService;
