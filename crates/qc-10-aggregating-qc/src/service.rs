//! `QuorumCertificateService`: the default `QuorumCertificateApi`
//! implementation, holding one `AggregatingQc` per block currently being
//! voted on.
//!
//! Reference: spec.md §4.6 — a block is tracked from the moment its
//! header state (and thus finalizer policies) is known until its QC
//! either reaches quorum and advances the LIB, or the block is dropped
//! from the fork database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{BlockNum, BlsPublicKeyBytes, FinalizerPolicyPtr};

use crate::domain::{AggregatingQc, IncomingVote, Qc, VoteOutcome, VoteStatus};
use crate::error::QcResult;
use crate::ports::inbound::QuorumCertificateApi;

pub struct QuorumCertificateService {
    blocks: RwLock<HashMap<BlockNum, AggregatingQc>>,
}

impl Default for QuorumCertificateService {
    fn default() -> Self {
        Self::new()
    }
}

impl QuorumCertificateService {
    pub fn new() -> Self {
        QuorumCertificateService { blocks: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl QuorumCertificateApi for QuorumCertificateService {
    async fn start_block(&self, block_num: BlockNum, active_policy: FinalizerPolicyPtr, pending_policy: Option<FinalizerPolicyPtr>) {
        self.blocks
            .write()
            .entry(block_num)
            .or_insert_with(|| AggregatingQc::new(active_policy, pending_policy));
    }

    async fn aggregate_vote(&self, block_num: BlockNum, vote: IncomingVote) -> QcResult<VoteOutcome> {
        let blocks = self.blocks.read();
        match blocks.get(&block_num) {
            Some(agg) => agg.aggregate_vote(&vote),
            None => Ok(VoteOutcome::UnknownPublicKey),
        }
    }

    async fn get_best_qc(&self, block_num: BlockNum) -> Option<Qc> {
        self.blocks.read().get(&block_num).and_then(|agg| agg.get_best_qc(block_num))
    }

    async fn set_received_qc(&self, qc: Qc) -> QcResult<bool> {
        let blocks = self.blocks.read();
        match blocks.get(&qc.block_num) {
            Some(agg) => agg.set_received_qc(&qc),
            None => Ok(false),
        }
    }

    async fn has_voted(&self, block_num: BlockNum, key: &BlsPublicKeyBytes) -> Option<VoteStatus> {
        self.blocks.read().get(&block_num).map(|agg| agg.has_voted(key))
    }

    async fn missing_votes(&self, block_num: BlockNum) -> Vec<BlsPublicKeyBytes> {
        self.blocks.read().get(&block_num).map(|agg| agg.missing_votes()).unwrap_or_default()
    }

    async fn forget_block(&self, block_num: BlockNum) {
        self.blocks.write().remove(&block_num);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::BlsKeyPair;
    use shared_types::{FinalizerAuthority, FinalizerPolicy};
    use std::sync::Arc;

    fn policy(keys: &[BlsKeyPair], threshold: u64) -> FinalizerPolicyPtr {
        Arc::new(FinalizerPolicy {
            generation: 1,
            threshold,
            finalizers: keys
                .iter()
                .map(|kp| FinalizerAuthority { description: String::new(), weight: 1, public_key: kp.public_key().to_bytes() })
                .collect(),
        })
    }

    #[tokio::test]
    async fn untracked_block_reports_no_votes_and_no_qc() {
        let service = QuorumCertificateService::new();
        assert!(service.get_best_qc(1).await.is_none());
        assert!(service.missing_votes(1).await.is_empty());
        let kp = BlsKeyPair::generate();
        assert!(service.has_voted(1, &kp.public_key().to_bytes()).await.is_none());
    }

    #[tokio::test]
    async fn start_then_vote_through_the_trait_reaches_quorum() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let service: Box<dyn QuorumCertificateApi> = Box::new(QuorumCertificateService::new());
        service.start_block(5, active, None).await;

        let digest = [3u8; 32];
        for kp in &keys {
            let sig = kp.sign(&digest);
            let outcome = service
                .aggregate_vote(5, IncomingVote { finalizer_key: kp.public_key().to_bytes(), strong: true, signature: sig.to_bytes(), signed_digest: digest })
                .await
                .unwrap();
            assert_eq!(outcome, VoteOutcome::Accepted);
        }

        let qc = service.get_best_qc(5).await.unwrap();
        assert!(qc.active_policy_sig.is_strong());

        service.forget_block(5).await;
        assert!(service.get_best_qc(5).await.is_none());
    }
}
