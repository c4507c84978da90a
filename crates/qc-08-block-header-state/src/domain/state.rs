//! `BlockHeaderState`: the immutable, shared-ownership node every fork
//! branch is built from, and its `next()` derivation.
//!
//! Reference: spec.md §3 "Block header state", §4.2.

use std::sync::Arc;

use shared_types::{
    BlockNum, BlockRef, FinalizerPolicyPtr, ProposerPolicyPtr, ProtocolFeatureActivationSet, Slot,
};

use crate::domain::digest::{self, FinalityDigestInput};
use crate::domain::finality_core::FinalityCore;
use crate::domain::header::{BlockHeader, FinalityExtension, HeaderInput};
use crate::domain::policy::{
    FinalizerPolicyQueue, PendingFinalizerPolicy, ProposedFinalizerPolicy, ProposerPolicyQueue,
    PRODUCER_REPETITIONS,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::outbound::BlockAtHeight;

/// One node in the fork-branch arena. Parents never reference children;
/// children hold an `Arc` to whatever policies/cores they inherit.
#[derive(Debug, Clone)]
pub struct BlockHeaderState {
    pub block_id: shared_types::Hash,
    pub block_num: BlockNum,
    pub header: BlockHeader,
    pub core: FinalityCore,
    pub proposer_queue: ProposerPolicyQueue,
    pub finalizer_queue: FinalizerPolicyQueue,
    pub last_pending_finalizer_policy_digest: shared_types::Hash,
    pub last_pending_finalizer_policy_start_timestamp: Slot,
    pub latest_qc_claim_block_active_finalizer_policy: Option<FinalizerPolicyPtr>,
    pub activated_protocol_features: ProtocolFeatureActivationSet,
    /// `finality_digest`, computed once at derivation time and carried
    /// alongside rather than recomputed on every `make_block_ref` call.
    cached_finality_digest: shared_types::Hash,
}

fn expected_producer_at(
    queue: &ProposerPolicyQueue,
    t_next: Slot,
    t_parent: Slot,
    lib_timestamp: Slot,
) -> CoreResult<shared_types::ProducerAuthority> {
    let effective = queue.select_active_for_validation(t_next, t_parent, lib_timestamp);
    let producers = &effective.proposer_schedule.producers;
    if producers.is_empty() {
        return Err(CoreError::WrongProducer(
            "proposer schedule is empty".into(),
        ));
    }
    let round = t_next / PRODUCER_REPETITIONS;
    let idx = (round as usize) % producers.len();
    Ok(producers[idx].clone())
}

impl BlockHeaderState {
    /// Construct the Savanna-activation block header state.
    pub fn genesis(
        genesis_block_num: BlockNum,
        timestamp: Slot,
        producer: shared_types::ProducerAuthority,
        proposer_policy: ProposerPolicyPtr,
        finalizer_policy: FinalizerPolicyPtr,
    ) -> Self {
        let header = BlockHeader {
            timestamp,
            producer,
            previous: shared_types::ZERO_HASH,
            confirmed: 0,
            transaction_mroot: shared_types::ZERO_HASH,
            action_mroot: shared_types::ZERO_HASH,
            schedule_version: crate::domain::header::SAVANNA_SCHEDULE_VERSION_CONSTANT,
            finality_extension: FinalityExtension {
                qc_claim: shared_types::QcClaim {
                    block_num: genesis_block_num,
                    is_strong_qc: false,
                },
                new_finalizer_policy_diff: None,
                new_proposer_policy_diff: None,
            },
        };
        let block_id = digest::digest_of(&header);
        let genesis_ref = BlockRef {
            block_id,
            block_num: genesis_block_num,
            timestamp,
            finality_digest: shared_types::ZERO_HASH,
            active_policy_generation: finalizer_policy.generation,
            pending_policy_generation: 0,
        };
        BlockHeaderState {
            block_id,
            block_num: genesis_block_num,
            header,
            core: FinalityCore::genesis(genesis_block_num, genesis_ref),
            proposer_queue: ProposerPolicyQueue {
                active: proposer_policy,
                latest_proposed: None,
                latest_pending: None,
            },
            finalizer_queue: FinalizerPolicyQueue {
                active: finalizer_policy,
                pending: None,
                proposed: Vec::new(),
            },
            last_pending_finalizer_policy_digest: shared_types::ZERO_HASH,
            last_pending_finalizer_policy_start_timestamp: timestamp,
            latest_qc_claim_block_active_finalizer_policy: None,
            activated_protocol_features: Arc::new(Vec::new()),
            cached_finality_digest: shared_types::ZERO_HASH,
        }
    }

    pub fn make_block_ref(&self) -> BlockRef {
        BlockRef {
            block_id: self.block_id,
            block_num: self.block_num,
            timestamp: self.header.timestamp,
            finality_digest: self.finality_digest(),
            active_policy_generation: self.finalizer_queue.active.generation,
            pending_policy_generation: self
                .finalizer_queue
                .pending
                .as_ref()
                .map(|p| p.policy.generation)
                .unwrap_or(0),
        }
    }

    fn finality_digest(&self) -> shared_types::Hash {
        self.cached_finality_digest
    }

    /// Derive the child state for one new block.
    pub fn next(&self, input: HeaderInput, port: &dyn BlockAtHeight) -> CoreResult<BlockHeaderState> {
        if input.timestamp <= self.header.timestamp {
            return Err(CoreError::BlockValidate(
                "block timestamp did not advance".into(),
            ));
        }

        // Step 2: protocol feature set.
        let activated_protocol_features = if input.new_protocol_feature_activations.is_empty() {
            self.activated_protocol_features.clone()
        } else {
            let mut v = (*self.activated_protocol_features).clone();
            v.extend(input.new_protocol_feature_activations.iter().cloned());
            Arc::new(v)
        };

        // Step 3: proposer policy promotion (against the parent's own core).
        let proposer_queue = self.proposer_queue.promote(
            input.timestamp,
            self.header.timestamp,
            self.core.last_final_block_timestamp(),
            input.new_proposer_policy_diff.as_ref(),
        )?;

        // Step 4: advance the finality core.
        let parent_ref = self.make_block_ref();
        let core = self.core.next(parent_ref, input.qc_claim)?;
        let block_num = core.block_num;

        // Step 5: finalizer policy promotion.
        let mut finalizer_queue =
            self.finalizer_queue
                .promote(block_num, input.timestamp, core.last_final_block_num);

        // Step 6: last pending finalizer policy digest, taken before step 7's append.
        let last_pending_finalizer_policy_digest =
            digest::digest_of(finalizer_queue.last_pending_finalizer_policy().as_ref());
        let last_pending_finalizer_policy_start_timestamp = finalizer_queue
            .pending
            .as_ref()
            .map(|p| p.start_timestamp)
            .unwrap_or(self.last_pending_finalizer_policy_start_timestamp);

        // Step 7: apply this block's own finalizer policy diff, if any.
        if let Some(diff) = &input.new_finalizer_policy_diff {
            let base = self
                .finalizer_queue
                .proposed
                .last()
                .map(|p| p.policy.as_ref())
                .unwrap_or(self.finalizer_queue.active.as_ref());
            let new_policy = diff.apply(base)?;
            finalizer_queue.proposed.push(ProposedFinalizerPolicy {
                proposal_block_num: block_num,
                policy: Arc::new(new_policy),
            });
            finalizer_queue.proposed.sort_by_key(|p| p.proposal_block_num);
        }

        // Step 8: latest_qc_claim_block_active_finalizer_policy.
        let latest_qc_claim_block_active_finalizer_policy = {
            let qc_block_num = core.latest_qc_claim.block_num;
            port.finalizer_policy_at(qc_block_num).and_then(|policy_then| {
                if policy_then.generation != finalizer_queue.active.generation {
                    Some(policy_then)
                } else {
                    None
                }
            })
        };

        // Step 1: assemble header + finality_extension.
        let extension = FinalityExtension {
            qc_claim: input.qc_claim,
            new_finalizer_policy_diff: input.new_finalizer_policy_diff.clone(),
            new_proposer_policy_diff: input.new_proposer_policy_diff.clone(),
        };
        let header = BlockHeader::new(&input, extension);

        let core_packed = core.pack_for_digest();
        let base_digest = digest::base_digest(
            &header,
            &core_packed,
            &finalizer_queue.proposed,
            &finalizer_queue.pending,
            &proposer_queue,
            &activated_protocol_features,
        );

        let (latest_qc_claim_finality_digest, latest_qc_claim_timestamp) = if core.is_genesis_core()
        {
            (shared_types::ZERO_HASH, 0)
        } else {
            let r = core.get_block_reference(core.latest_qc_claim.block_num);
            (r.finality_digest, r.timestamp)
        };

        let finality_digest = digest::finality_digest(&FinalityDigestInput {
            active_finalizer_policy_generation: finalizer_queue.active.generation,
            last_pending_finalizer_policy_generation: finalizer_queue
                .last_pending_finalizer_policy()
                .generation,
            finality_mroot: input.finality_mroot_claim,
            last_pending_fin_pol_digest: last_pending_finalizer_policy_digest,
            last_pending_fin_pol_start_timestamp: last_pending_finalizer_policy_start_timestamp,
            reversible_blocks_mroot: core.get_reversible_blocks_mroot(),
            latest_qc_claim_block_num: core.latest_qc_claim.block_num,
            latest_qc_claim_finality_digest,
            latest_qc_claim_timestamp,
            timestamp: input.timestamp,
            base_digest: &base_digest,
        });

        // Step 9: block_id from the final header.
        let block_id = digest::digest_of(&header);

        Ok(BlockHeaderState {
            block_id,
            block_num,
            header,
            core,
            proposer_queue,
            finalizer_queue,
            last_pending_finalizer_policy_digest,
            last_pending_finalizer_policy_start_timestamp,
            latest_qc_claim_block_active_finalizer_policy,
            activated_protocol_features,
            cached_finality_digest: finality_digest,
        })
    }

    /// Validate an incoming, already-decoded header against this state as
    /// its claimed parent, per spec.md §4.2.4.
    pub fn validate_incoming(
        &self,
        header: &BlockHeader,
        port: &dyn BlockAtHeight,
    ) -> CoreResult<BlockHeaderState> {
        if header.previous != self.block_id {
            return Err(CoreError::UnlinkableBlock(
                "header.previous does not match parent block_id".into(),
            ));
        }

        let expected = expected_producer_at(
            &self.proposer_queue,
            header.timestamp,
            self.header.timestamp,
            self.core.last_final_block_timestamp(),
        )?;
        if expected.authority != header.producer.authority {
            return Err(CoreError::WrongProducer(format!(
                "expected {}, got {}",
                expected.name, header.producer.name
            )));
        }

        if header.finality_extension.qc_claim.block_num == self.core.genesis_block_num
            && !header.action_mroot_is_empty()
        {
            return Err(CoreError::BlockValidate(
                "genesis qc claim requires an empty action_mroot".into(),
            ));
        }

        let reconstructed = HeaderInput {
            timestamp: header.timestamp,
            producer: header.producer.clone(),
            parent_id: header.previous,
            transaction_mroot: header.transaction_mroot,
            finality_mroot_claim: header.action_mroot,
            qc_claim: header.finality_extension.qc_claim,
            new_finalizer_policy_diff: header.finality_extension.new_finalizer_policy_diff.clone(),
            new_proposer_policy_diff: header.finality_extension.new_proposer_policy_diff.clone(),
            new_protocol_feature_activations: Vec::new(),
        };

        let derived = self.next(reconstructed, port)?;
        if derived.header != *header {
            return Err(CoreError::BlockValidate(
                "derived header does not match the incoming header".into(),
            ));
        }
        Ok(derived)
    }
}

impl ProposerPolicyQueue {
    /// Public wrapper used by validation; identical rule to the one
    /// `promote` applies internally (spec.md §4.2.1).
    pub fn select_active_for_validation(
        &self,
        t_next: Slot,
        t_parent: Slot,
        lib_timestamp: Slot,
    ) -> ProposerPolicyPtr {
        self.select_active(t_next, t_parent, lib_timestamp)
    }
}
