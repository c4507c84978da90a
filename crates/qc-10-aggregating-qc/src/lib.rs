//! # qc-10-aggregating-qc — online BLS quorum-certificate aggregation
//!
//! Component E of the Savanna finality engine (spec.md §4.5): accumulates
//! finalizer votes into a per-block, per-policy BLS signature aggregate,
//! tracking the monotone `unrestricted -> restricted -> {weak_achieved,
//! weak_final} -> strong` state machine and the best QC seen either
//! locally assembled or received over the network.
//!
//! ## Crate layout
//!
//! - [`domain::aggregator`] — `AggregatingQcSig`, the single-policy
//!   accumulator and its strong/weak state transitions.
//! - [`domain::qc`] — `AggregatingQc`, pairing an active and optional
//!   pending policy aggregator and routing one vote to both.
//! - [`domain::verify`] — standalone validation of an incoming `Qc`
//!   (shape, weights, dual-finalizer invariant, BLS signatures).
//! - [`service`] — the default `QuorumCertificateApi` implementation,
//!   tracking one `AggregatingQc` per in-flight block.
//!
//! This crate treats BLS aggregation/verification itself as provided by
//! `shared-crypto`; it owns only the accumulation and state-machine logic
//! layered on top.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    AddVoteOutcome, AggregatingQc, AggregatingQcSig, AggregatingState, IncomingVote, Qc, QcSig, VoteBitset, VoteOutcome, VoteStatus,
};
pub use error::{QcError, QcResult};
pub use ports::QuorumCertificateApi;
pub use service::QuorumCertificateService;
