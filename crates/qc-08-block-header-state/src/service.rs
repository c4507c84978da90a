//! `BlockHeaderStateService`: the default `BlockHeaderStateApi`
//! implementation, holding a minimal in-memory arena of derived states
//! keyed by `block_id`.
//!
//! Reference: spec.md §9 "Fork database back-edges" — the real arena is
//! owned externally by the fork database; this service's `states` map is
//! a convenience cache for callers that don't maintain their own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{BlockHeader, BlockHeaderState, HeaderInput};
use crate::error::{CoreError, CoreResult};
use crate::ports::inbound::BlockHeaderStateApi;
use crate::ports::outbound::BlockAtHeight;

pub struct BlockHeaderStateService<P: BlockAtHeight> {
    historical_policies: Arc<P>,
    states: RwLock<HashMap<shared_types::Hash, BlockHeaderState>>,
}

impl<P: BlockAtHeight> BlockHeaderStateService<P> {
    pub fn new(historical_policies: Arc<P>, genesis: BlockHeaderState) -> Self {
        let mut states = HashMap::new();
        states.insert(genesis.block_id, genesis);
        BlockHeaderStateService {
            historical_policies,
            states: RwLock::new(states),
        }
    }

    fn parent(&self, parent_block_id: shared_types::Hash) -> CoreResult<BlockHeaderState> {
        self.states
            .read()
            .get(&parent_block_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("parent block header state".into()))
    }
}

#[async_trait]
impl<P: BlockAtHeight> BlockHeaderStateApi for BlockHeaderStateService<P> {
    async fn derive_next(
        &self,
        parent_block_id: shared_types::Hash,
        input: HeaderInput,
    ) -> CoreResult<BlockHeaderState> {
        let parent = self.parent(parent_block_id)?;
        let child = parent.next(input, self.historical_policies.as_ref())?;
        self.states.write().insert(child.block_id, child.clone());
        Ok(child)
    }

    async fn validate_incoming(
        &self,
        parent_block_id: shared_types::Hash,
        header: BlockHeader,
    ) -> CoreResult<BlockHeaderState> {
        let parent = self.parent(parent_block_id)?;
        let child = parent.validate_incoming(&header, self.historical_policies.as_ref())?;
        self.states.write().insert(child.block_id, child.clone());
        Ok(child)
    }

    async fn get_state(&self, block_id: shared_types::Hash) -> Option<BlockHeaderState> {
        self.states.read().get(&block_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::NoHistoricalPolicies;
    use shared_types::{FinalizerPolicy, ProducerAuthority, ProposerPolicy, ProposerSchedule};

    fn producer(name: &str) -> ProducerAuthority {
        ProducerAuthority {
            name: name.to_string(),
            authority: [0u8; 48],
        }
    }

    fn genesis() -> BlockHeaderState {
        let proposer_policy = Arc::new(ProposerPolicy {
            proposal_time: 0,
            proposer_schedule: ProposerSchedule {
                version: 1,
                producers: vec![producer("alice")],
            },
        });
        let finalizer_policy = Arc::new(FinalizerPolicy {
            generation: 1,
            threshold: 1,
            finalizers: vec![],
        });
        BlockHeaderState::genesis(1, 0, producer("alice"), proposer_policy, finalizer_policy)
    }

    #[tokio::test]
    async fn derive_next_is_retrievable_by_block_id() {
        let g = genesis();
        let g_id = g.block_id;
        let service = BlockHeaderStateService::new(Arc::new(NoHistoricalPolicies), g);

        let input = HeaderInput {
            timestamp: 1,
            producer: producer("alice"),
            parent_id: g_id,
            transaction_mroot: shared_types::ZERO_HASH,
            finality_mroot_claim: shared_types::ZERO_HASH,
            qc_claim: shared_types::QcClaim {
                block_num: 1,
                is_strong_qc: false,
            },
            new_finalizer_policy_diff: None,
            new_proposer_policy_diff: None,
            new_protocol_feature_activations: vec![],
        };
        let child = service.derive_next(g_id, input).await.unwrap();
        let fetched = service.get_state(child.block_id).await.unwrap();
        assert_eq!(fetched.block_num, child.block_num);
    }

    #[tokio::test]
    async fn derive_next_fails_for_unknown_parent() {
        let g = genesis();
        let service = BlockHeaderStateService::new(Arc::new(NoHistoricalPolicies), g);
        let input = HeaderInput {
            timestamp: 1,
            producer: producer("alice"),
            parent_id: [9u8; 32],
            transaction_mroot: shared_types::ZERO_HASH,
            finality_mroot_claim: shared_types::ZERO_HASH,
            qc_claim: shared_types::QcClaim {
                block_num: 1,
                is_strong_qc: false,
            },
            new_finalizer_policy_diff: None,
            new_proposer_policy_diff: None,
            new_protocol_feature_activations: vec![],
        };
        let err = service.derive_next([9u8; 32], input).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
