//! Domain layer: pure per-finalizer vote decision, safety-info
//! persistence, and the multi-finalizer aggregate that batches both.
//!
//! Reference: spec.md §4.4, §9 "Shared ownership of policies and cores"
//! (FSI is exclusively owned by the local `my_finalizers` aggregate).

pub mod decision;
pub mod finalizer_set;
pub mod fsi_store;

pub use decision::{decide_vote, maybe_update_fsi, VoteInput, VoteResult};
pub use finalizer_set::{CastVote, FinalizerSet, QcObservation};
pub use fsi_store::FsiStore;
