//! Domain layer: the per-policy BLS vote aggregator, the active/pending
//! `AggregatingQc` that routes votes to both, and the standalone
//! validation of an incoming `Qc`.
//!
//! Reference: spec.md §4.5; grounded on
//! `original_source/libraries/chain/qc.cpp` and `qc.hpp`.

pub mod aggregator;
pub mod entities;
pub mod qc;
pub mod verify;

pub use aggregator::{AddVoteOutcome, AggregatingQcSig, AggregatingState};
pub use entities::{Qc, QcSig, VoteBitset, VoteStatus};
pub use qc::{AggregatingQc, IncomingVote, VoteOutcome};
pub use verify::{verify_basic, verify_signatures, weak_digest};
