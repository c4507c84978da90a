//! Component C: the per-block finality core — a compact 2-chain window
//! between `last_final_block_num` and the block owning this core.
//!
//! Reference: spec.md §3 "Finality core" and §4.3.
//!
//! Grounded on spec.md's explicit description of the advancement rule;
//! the original's `finality_core` type lives in a header not present in
//! the retrieval pack (only `block_header_state.cpp`'s call sites survive
//! — see `DESIGN.md`), so the 2-chain link-walk below is this
//! specification's own derivation, chosen because it reproduces the
//! worked example in spec.md §8 scenario 1 exactly (a 12-block run of
//! consecutive strong QC claims settles `last_final_block_num = N-2`).

use serde::{Deserialize, Serialize};
use shared_types::{BlockNum, BlockRef, Hash, QcClaim, Slot};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

/// One recorded claim relationship: the block `source_block_num` is the
/// target of a QC claim made by the block `target_block_num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_block_num: BlockNum,
    pub target_block_num: BlockNum,
    pub is_link_strong: bool,
}

/// The 2-chain finality bookkeeping owned by every block header state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityCore {
    /// The block number this core belongs to ("current_block_num" in
    /// spec.md's invariant).
    pub block_num: BlockNum,
    /// The block number of the chain's Savanna-activation (genesis) core,
    /// carried forward unchanged by every descendant.
    pub genesis_block_num: BlockNum,
    pub links: Vec<Link>,
    pub latest_qc_claim: QcClaim,
    pub last_final_block_num: BlockNum,
    pub final_on_strong_qc_block_num: BlockNum,
    refs: BTreeMap<BlockNum, BlockRef>,
}

impl FinalityCore {
    /// The core for the Savanna-activation block: no history, every
    /// tracked number equal to the genesis block's own number.
    pub fn genesis(genesis_block_num: BlockNum, genesis_ref: BlockRef) -> Self {
        let mut refs = BTreeMap::new();
        refs.insert(genesis_block_num, genesis_ref);
        FinalityCore {
            block_num: genesis_block_num,
            genesis_block_num,
            links: Vec::new(),
            latest_qc_claim: QcClaim {
                block_num: genesis_block_num,
                is_strong_qc: false,
            },
            last_final_block_num: genesis_block_num,
            final_on_strong_qc_block_num: genesis_block_num,
            refs,
        }
    }

    pub fn is_genesis_core(&self) -> bool {
        self.links.is_empty() && self.block_num == self.genesis_block_num
    }

    pub fn is_genesis_block_num(&self, n: BlockNum) -> bool {
        n == self.genesis_block_num
    }

    pub fn latest_qc_claim(&self) -> QcClaim {
        self.latest_qc_claim
    }

    /// The reference for any block number in `[last_final_block_num,
    /// block_num]`. Aborts outside that range or if the reference was
    /// already pruned, matching spec.md §4.3's "aborts otherwise".
    pub fn get_block_reference(&self, num: BlockNum) -> BlockRef {
        assert!(
            num >= self.last_final_block_num && num <= self.block_num,
            "block reference {num} outside reversible window [{}, {}]",
            self.last_final_block_num,
            self.block_num
        );
        *self
            .refs
            .get(&num)
            .expect("reference for in-window block number must be retained")
    }

    pub fn last_final_block_timestamp(&self) -> Slot {
        self.get_block_reference(self.last_final_block_num).timestamp
    }

    pub fn latest_qc_block_timestamp(&self) -> Slot {
        self.get_block_reference(self.latest_qc_claim.block_num).timestamp
    }

    /// True iff `other` is the reference this core itself retains at
    /// `other.block_num`, i.e. `other`'s block lies on this core's chain.
    pub fn extends(&self, other: &BlockRef) -> bool {
        if other.block_num < self.last_final_block_num || other.block_num > self.block_num {
            return false;
        }
        self.refs
            .get(&other.block_num)
            .is_some_and(|r| r.block_id == other.block_id)
    }

    /// A commitment to every reference still held above
    /// `last_final_block_num`, computed as a simple binary Merkle root
    /// over their packed bytes (ascending block-number order).
    pub fn get_reversible_blocks_mroot(&self) -> Hash {
        let leaves: Vec<Hash> = self
            .refs
            .iter()
            .filter(|(num, _)| **num > self.last_final_block_num)
            .map(|(_, r)| shared_crypto::hashing::sha256(&bincode::serialize(r).unwrap()))
            .collect();
        shared_crypto::hashing::merkle_root(&leaves)
    }

    /// Bytes this core contributes to the block header's `base_digest`.
    pub fn pack_for_digest(&self) -> Vec<u8> {
        bincode::serialize(&(
            self.block_num,
            &self.links,
            self.latest_qc_claim,
            self.last_final_block_num,
            self.final_on_strong_qc_block_num,
        ))
        .expect("finality core digest packing cannot fail")
    }

    /// Advance the core by one block. `parent_ref` is the parent block's
    /// own completed `block_ref` (recorded into the per-height map so
    /// later blocks can look it up); `new_qc_claim` is the claim carried
    /// by the child's `finality_extension`.
    pub fn next(&self, parent_ref: BlockRef, new_qc_claim: QcClaim) -> CoreResult<FinalityCore> {
        if new_qc_claim.block_num < self.latest_qc_claim.block_num {
            return Err(CoreError::InvalidQcClaim(
                "qc claim block num regressed".into(),
            ));
        }
        if new_qc_claim.block_num > self.block_num {
            return Err(CoreError::InvalidQcClaim(
                "qc claim references a block beyond the parent's own number".into(),
            ));
        }
        if new_qc_claim.block_num == self.latest_qc_claim.block_num
            && new_qc_claim.is_strong_qc
            && !self.latest_qc_claim.is_strong_qc
        {
            return Err(CoreError::InvalidQcClaim(
                "cannot assert a strong claim on a block already known to be weak".into(),
            ));
        }

        let new_block_num = self.block_num + 1;

        let mut final_on_strong_qc_block_num = self.final_on_strong_qc_block_num;
        let mut last_final_block_num = self.last_final_block_num;
        if new_qc_claim.is_strong_qc {
            final_on_strong_qc_block_num = new_qc_claim.block_num;
            if let Some(prior_link) = self
                .links
                .iter()
                .find(|l| l.target_block_num == new_qc_claim.block_num)
            {
                if prior_link.is_link_strong {
                    last_final_block_num = last_final_block_num.max(prior_link.source_block_num);
                }
            }
        }

        let mut links = self.links.clone();
        links.push(Link {
            source_block_num: new_qc_claim.block_num,
            target_block_num: new_block_num,
            is_link_strong: new_qc_claim.is_strong_qc,
        });
        links.retain(|l| l.target_block_num >= last_final_block_num);

        let mut refs = self.refs.clone();
        refs.insert(self.block_num, parent_ref);
        refs.retain(|num, _| *num >= last_final_block_num);

        Ok(FinalityCore {
            block_num: new_block_num,
            genesis_block_num: self.genesis_block_num,
            links,
            latest_qc_claim: new_qc_claim,
            last_final_block_num,
            final_on_strong_qc_block_num,
            refs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_ref(num: BlockNum, parent_digest_seed: u8) -> BlockRef {
        BlockRef {
            block_id: [parent_digest_seed; 32],
            block_num: num,
            timestamp: num as Slot,
            finality_digest: [0u8; 32],
            active_policy_generation: 1,
            pending_policy_generation: 0,
        }
    }

    #[test]
    fn linear_strong_chain_settles_last_final_two_behind() {
        // spec.md §8 scenario 1: 12 consecutive blocks, each strong QC on
        // the immediately preceding block => after block N, LFBN = N-2.
        let mut core = FinalityCore::genesis(1, block_ref(1, 1));
        let mut parent_ref = block_ref(1, 1);
        for n in 2..=13u32 {
            let claim = QcClaim {
                block_num: n - 1,
                is_strong_qc: true,
            };
            core = core.next(parent_ref, claim).unwrap();
            parent_ref = block_ref(n, n as u8);
            if n >= 4 {
                assert_eq!(core.last_final_block_num, n - 2, "at block {n}");
            }
        }
    }

    #[test]
    fn claim_cannot_regress() {
        let core = FinalityCore::genesis(1, block_ref(1, 1));
        let core = core
            .next(block_ref(1, 1), QcClaim { block_num: 1, is_strong_qc: true })
            .unwrap();
        let err = core
            .next(
                block_ref(2, 2),
                QcClaim { block_num: 0, is_strong_qc: true },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQcClaim(_)));
    }

    #[test]
    fn weak_then_strong_same_target_is_rejected() {
        let core = FinalityCore::genesis(1, block_ref(1, 1));
        let core = core
            .next(block_ref(1, 1), QcClaim { block_num: 1, is_strong_qc: false })
            .unwrap();
        let err = core
            .next(block_ref(2, 2), QcClaim { block_num: 1, is_strong_qc: true })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQcClaim(_)));
    }

    #[test]
    fn extends_true_only_on_own_chain() {
        let core = FinalityCore::genesis(1, block_ref(1, 1));
        let core = core
            .next(block_ref(1, 1), QcClaim { block_num: 1, is_strong_qc: true })
            .unwrap();
        assert!(core.extends(&block_ref(1, 1)));
        assert!(!core.extends(&block_ref(1, 99)));
    }
}
