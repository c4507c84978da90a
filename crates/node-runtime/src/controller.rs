//! `SavannaController`: the single controller-thread orchestrator that
//! wires the object store, block header state, finalizer vote decision,
//! and aggregating QC components together per the block lifecycle.
//!
//! Reference: spec.md §4.6, §5 "Concurrency & resource model". Per §5,
//! derivation/core/store mutation happens on one controller thread.
//! [`SavannaController::record_vote`] is the seam where an incoming vote
//! (local or received over the network) reaches the QC aggregator.

use std::collections::HashMap;
use std::sync::Arc;

use qc_02_object_store::Database;
use qc_08_block_header_state::{BlockAtHeight, BlockHeaderState, BlockHeaderStateApi, BlockHeaderStateService, HeaderInput};
use qc_09_finality::{CastVote, FinalizerVoteApi, FinalizerVoteService, QcObservation, VoteInput};
use qc_10_aggregating_qc::{IncomingVote, Qc, QuorumCertificateApi, QuorumCertificateService, VoteOutcome};
use shared_types::{BlockNum, BlsPublicKeyBytes};

use crate::config::SavannaConfig;

/// Owned handles to the four Savanna components, wired together on one
/// controller thread.
pub struct SavannaController<P: BlockAtHeight> {
    pub config: SavannaConfig,
    pub store: Database,
    pub headers: BlockHeaderStateService<P>,
    pub finalizers: FinalizerVoteService,
    pub qcs: Arc<QuorumCertificateService>,
}

impl<P: BlockAtHeight> SavannaController<P> {
    pub fn new(config: SavannaConfig, store: Database, headers: BlockHeaderStateService<P>, finalizers: FinalizerVoteService) -> Self {
        SavannaController { config, store, headers, finalizers, qcs: Arc::new(QuorumCertificateService::new()) }
    }

    /// Step 1 of the per-block lifecycle: derive the child header state
    /// under an object-store undo session, then start QC aggregation for
    /// it under its (possibly newly promoted) finalizer policies.
    pub async fn accept_block(&self, parent_block_id: shared_types::Hash, input: HeaderInput) -> anyhow::Result<BlockHeaderState> {
        let session = self.store.start_undo_session(true);
        let child = self.headers.derive_next(parent_block_id, input).await?;

        self.qcs
            .start_block(
                child.block_num,
                child.finalizer_queue.active.clone(),
                child.finalizer_queue.pending.as_ref().map(|p| p.policy.clone()),
            )
            .await;

        session.push();
        Ok(child)
    }

    /// Step 2: run every locally configured finalizer's vote decision
    /// for the block just accepted.
    pub async fn decide_local_votes(&self, inputs: HashMap<BlsPublicKeyBytes, VoteInput>) -> anyhow::Result<Vec<CastVote>> {
        Ok(self.finalizers.decide_votes(inputs).await?)
    }

    /// Crash-recovery fast-forward: a finalizer's FSI advances because an
    /// externally observed QC proves it (or another finalizer sharing its
    /// key) already voted strong on a descendant.
    pub async fn observe_qc(&self, observation: QcObservation) -> anyhow::Result<bool> {
        Ok(self.finalizers.observe_qc(observation).await?)
    }

    /// Step 3: route one incoming vote (local or received over the
    /// network) to the tracked block's QC aggregator.
    pub async fn record_vote(&self, block_num: BlockNum, vote: IncomingVote) -> anyhow::Result<VoteOutcome> {
        Ok(self.qcs.aggregate_vote(block_num, vote).await?)
    }

    /// The best QC known for a block, if quorum has been reached.
    pub async fn best_qc(&self, block_num: BlockNum) -> Option<Qc> {
        self.qcs.get_best_qc(block_num).await
    }

    /// Record an externally received QC as a `best_qc` candidate.
    pub async fn set_received_qc(&self, qc: Qc) -> anyhow::Result<bool> {
        Ok(self.qcs.set_received_qc(qc).await?)
    }

    /// Step 4: once a block's QC advances the last-irreversible-block,
    /// discard undo history behind it and drop QC-tracking state for
    /// everything at or below the new LIB.
    pub async fn advance_lib(&self, new_lib_revision: i64, committed_block_nums: &[BlockNum]) {
        self.store.commit(new_lib_revision);
        for &block_num in committed_block_nums {
            self.qcs.forget_block(block_num).await;
        }
    }
}
