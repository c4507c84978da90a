//! Driving port: the API the node runtime calls into as votes arrive
//! over the network and as it forms its own QCs (spec.md §4.6 step 3).

use async_trait::async_trait;
use shared_types::{BlockNum, BlsPublicKeyBytes, FinalizerPolicyPtr};

use crate::domain::{IncomingVote, Qc, VoteOutcome, VoteStatus};
use crate::error::QcResult;

/// Online BLS quorum-certificate aggregation for in-flight blocks.
#[async_trait]
pub trait QuorumCertificateApi: Send + Sync {
    /// Begin aggregating votes for `block_num` under the given active
    /// (and optional pending) finalizer policy. Idempotent: calling it
    /// again for a block already being tracked is a no-op.
    async fn start_block(&self, block_num: BlockNum, active_policy: FinalizerPolicyPtr, pending_policy: Option<FinalizerPolicyPtr>);

    /// Route one incoming vote to the tracked block's aggregator(s).
    async fn aggregate_vote(&self, block_num: BlockNum, vote: IncomingVote) -> QcResult<VoteOutcome>;

    /// The best QC known for `block_num`, or `None` if quorum has not
    /// been reached (or the block is not tracked at all).
    async fn get_best_qc(&self, block_num: BlockNum) -> Option<Qc>;

    /// Record an externally received QC as a candidate for `get_best_qc`.
    async fn set_received_qc(&self, qc: Qc) -> QcResult<bool>;

    /// Whether `key` has voted on `block_num`, per the active/pending
    /// policy precedence rules, or `None` if the block is not tracked.
    async fn has_voted(&self, block_num: BlockNum, key: &BlsPublicKeyBytes) -> Option<VoteStatus>;

    /// Finalizers still missing a vote on `block_num`.
    async fn missing_votes(&self, block_num: BlockNum) -> Vec<BlsPublicKeyBytes>;

    /// Drop tracking state for a block once it is committed or discarded.
    async fn forget_block(&self, block_num: BlockNum);
}
