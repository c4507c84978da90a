//! Driving port: the API the node runtime calls into per accepted block,
//! once per locally configured finalizer (spec.md §4.6 step 2).

use std::collections::HashMap;

use async_trait::async_trait;
use shared_types::BlsPublicKeyBytes;

use crate::domain::{CastVote, QcObservation, VoteInput};
use crate::error::FinalityResult;

/// Finalizer vote decision and safety-info recovery.
#[async_trait]
pub trait FinalizerVoteApi: Send + Sync {
    /// Decide, for every configured finalizer with an entry in `inputs`,
    /// whether to cast a vote on this block — persisting the whole
    /// batch's FSI mutation before returning.
    async fn decide_votes(&self, inputs: HashMap<BlsPublicKeyBytes, VoteInput>) -> FinalityResult<Vec<CastVote>>;

    /// Fast-forward one finalizer's safety info from an externally
    /// observed QC (crash-recovery path).
    async fn observe_qc(&self, observation: QcObservation) -> FinalityResult<bool>;
}
