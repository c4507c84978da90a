//! The per-block vote decision: monotony, liveness, safety, and the
//! strong-vs-weak choice.
//!
//! Reference: spec.md §4.4 steps 1-8; grounded on
//! `original_source/libraries/chain/finalizer.cpp`'s `finalizer::decide_vote`
//! and `finalizer::maybe_update_fsi`.
//!
//! This module takes no dependency on the finality core or block header
//! state types (§9 open question: those live in `qc-08-block-header-state`,
//! a sibling crate this one deliberately does not depend on). Callers
//! compute `VoteInput`'s two `extends_*` fields via the finality core's
//! `extends()` before calling [`decide_vote`].

use shared_types::{BlockRef, FinalizerSafetyInfo, Slot, VoteStrength};

/// Everything [`decide_vote`] needs about the candidate block and its
/// finality core, captured by the caller so this crate stays decoupled
/// from the block-header-state crate.
#[derive(Debug, Clone, Copy)]
pub struct VoteInput {
    /// `bsp.make_block_ref()` — the reference this vote would record.
    pub block_ref: BlockRef,
    /// `bsp.core.latest_qc_block_timestamp()`.
    pub latest_qc_block_timestamp: Slot,
    /// `bsp.core.get_block_reference(bsp.core.latest_qc_claim().block_num)`,
    /// the block a strong vote would lock on.
    pub latest_qc_claim_block_ref: BlockRef,
    /// `bsp.core.extends(&fsi.lock)`, computed by the caller against the
    /// *current* `fsi.lock` before calling `decide_vote`.
    pub extends_lock: bool,
    /// `bsp.core.extends(&fsi.last_vote)`, computed the same way.
    pub extends_last_vote: bool,
}

/// The three gating checks plus the resulting decision, mirroring the
/// original's `vote_result` so callers can log exactly why a vote was or
/// wasn't cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResult {
    pub monotony_check: bool,
    pub liveness_check: bool,
    pub safety_check: bool,
    pub decision: Option<VoteStrength>,
}

impl VoteResult {
    fn abstain(monotony_check: bool, liveness_check: bool, safety_check: bool) -> Self {
        VoteResult {
            monotony_check,
            liveness_check,
            safety_check,
            decision: None,
        }
    }
}

/// Decide whether `fsi`'s owner should vote on this block, and if so,
/// strong or weak. Mutates `fsi.last_vote`, `fsi.lock`, and
/// `fsi.other_branch_latest_time` exactly as the original does — callers
/// must persist `fsi` (see [`crate::domain::fsi_store`]) whenever
/// `decision` is `Some`.
pub fn decide_vote(fsi: &mut FinalizerSafetyInfo, input: &VoteInput) -> VoteResult {
    // 1. Monotony: never vote on a block no later than our last vote.
    // `fsi.last_vote.empty()` carries a timestamp of 0, so the comparison
    // alone handles the "never voted" case.
    let monotony_check = fsi.last_vote.is_empty() || input.block_ref.timestamp > fsi.last_vote.timestamp;
    if !monotony_check {
        return VoteResult::abstain(false, false, false);
    }

    // 2/3/4. Liveness and safety. An empty lock means IF hasn't started
    // for this finalizer (or it was never given a starting lock) — both
    // checks fail defensively.
    let (liveness_check, safety_check) = if fsi.lock.is_empty() {
        (false, false)
    } else {
        let liveness = input.latest_qc_block_timestamp > fsi.lock.timestamp;
        let safety = if liveness { false } else { input.extends_lock };
        (liveness, safety)
    };

    let can_vote = liveness_check || safety_check;
    if !can_vote {
        return VoteResult::abstain(monotony_check, liveness_check, safety_check);
    }

    // 5/6. Strong-vs-weak. `fsi.last_vote.timestamp` and
    // `fsi.other_branch_latest_time` both default to 0 when unset, so no
    // separate "not set" branch is needed.
    let decision = if fsi.last_vote.timestamp <= input.latest_qc_block_timestamp {
        VoteStrength::Strong
    } else if input.extends_last_vote {
        if fsi.other_branch_latest_time <= input.latest_qc_block_timestamp {
            VoteStrength::Strong
        } else {
            VoteStrength::Weak
        }
    } else {
        fsi.other_branch_latest_time = fsi.last_vote.timestamp;
        VoteStrength::Weak
    };

    // 7. On a strong vote, reset the other-branch marker and advance the
    // lock if the new QC claim is newer than what we're currently locked on.
    if decision == VoteStrength::Strong {
        fsi.other_branch_latest_time = 0;
        if input.latest_qc_block_timestamp > fsi.lock.timestamp {
            fsi.lock = input.latest_qc_claim_block_ref;
        }
    }

    // 8. Record the vote regardless of strength.
    fsi.last_vote = input.block_ref;

    VoteResult {
        monotony_check,
        liveness_check,
        safety_check,
        decision: Some(decision),
    }
}

/// Recovery path: given a strong QC observed on the wire that includes
/// this finalizer's bit (so it must have voted strong even if its own
/// `fsi` was never updated, e.g. after a crash before the save landed),
/// advance `fsi` if doing so strictly tightens both the lock and the
/// last-vote timestamp. Returns whether `fsi` was changed.
pub fn maybe_update_fsi(fsi: &mut FinalizerSafetyInfo, qc_block_ref: BlockRef, voted_block_ref: BlockRef) -> bool {
    if qc_block_ref.timestamp > fsi.lock.timestamp && voted_block_ref.timestamp > fsi.last_vote.timestamp {
        fsi.lock = qc_block_ref;
        fsi.last_vote = voted_block_ref;
        fsi.other_branch_latest_time = 0;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_ref(block_num: u32, timestamp: Slot) -> BlockRef {
        BlockRef {
            block_id: [block_num as u8; 32],
            block_num,
            timestamp,
            finality_digest: [0u8; 32],
            active_policy_generation: 0,
            pending_policy_generation: 0,
        }
    }

    #[test]
    fn first_vote_after_transition_is_strong_when_lock_is_set() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: BlockRef::empty(),
            lock: block_ref(1, 10),
            other_branch_latest_time: 0,
        };
        let input = VoteInput {
            block_ref: block_ref(5, 50),
            latest_qc_block_timestamp: 40,
            latest_qc_claim_block_ref: block_ref(4, 40),
            extends_lock: true,
            extends_last_vote: true,
        };
        let result = decide_vote(&mut fsi, &input);
        assert_eq!(result.decision, Some(VoteStrength::Strong));
        assert_eq!(fsi.lock.block_num, 4);
        assert_eq!(fsi.last_vote.block_num, 5);
        assert_eq!(fsi.other_branch_latest_time, 0);
    }

    #[test]
    fn empty_lock_abstains() {
        let mut fsi = FinalizerSafetyInfo::empty();
        let input = VoteInput {
            block_ref: block_ref(1, 10),
            latest_qc_block_timestamp: 0,
            latest_qc_claim_block_ref: BlockRef::empty(),
            extends_lock: false,
            extends_last_vote: false,
        };
        let result = decide_vote(&mut fsi, &input);
        assert!(!result.liveness_check);
        assert!(!result.safety_check);
        assert_eq!(result.decision, None);
        assert!(fsi.last_vote.is_empty());
    }

    #[test]
    fn monotony_blocks_a_stale_or_repeated_block() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: block_ref(5, 50),
            lock: block_ref(1, 10),
            other_branch_latest_time: 0,
        };
        let input = VoteInput {
            block_ref: block_ref(5, 50),
            latest_qc_block_timestamp: 50,
            latest_qc_claim_block_ref: block_ref(5, 50),
            extends_lock: true,
            extends_last_vote: true,
        };
        let result = decide_vote(&mut fsi, &input);
        assert!(!result.monotony_check);
        assert_eq!(result.decision, None);
    }

    #[test]
    fn forking_off_last_vote_votes_weak_and_records_other_branch() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: block_ref(5, 50),
            lock: block_ref(1, 10),
            other_branch_latest_time: 0,
        };
        // Liveness passes (QC timestamp 60 > lock 10), but this block does
        // not extend last_vote and last_vote's timestamp (50) is above the
        // latest QC block timestamp (40), so it must be weak.
        let input = VoteInput {
            block_ref: block_ref(6, 70),
            latest_qc_block_timestamp: 40,
            latest_qc_claim_block_ref: block_ref(3, 40),
            extends_lock: true,
            extends_last_vote: false,
        };
        let result = decide_vote(&mut fsi, &input);
        assert_eq!(result.decision, Some(VoteStrength::Weak));
        assert_eq!(fsi.other_branch_latest_time, 50);
        // A weak vote never advances the lock.
        assert_eq!(fsi.lock.block_num, 1);
    }

    #[test]
    fn liveness_restores_voting_on_a_stale_lock() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: BlockRef::empty(),
            lock: block_ref(1, 10),
            other_branch_latest_time: 0,
        };
        let input = VoteInput {
            block_ref: block_ref(9, 90),
            latest_qc_block_timestamp: 80,
            latest_qc_claim_block_ref: block_ref(8, 80),
            extends_lock: false,
            extends_last_vote: false,
        };
        let result = decide_vote(&mut fsi, &input);
        assert!(result.liveness_check);
        assert_eq!(result.decision, Some(VoteStrength::Strong));
        assert_eq!(fsi.lock.block_num, 8);
    }

    #[test]
    fn maybe_update_fsi_advances_on_observed_strong_qc() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: block_ref(2, 20),
            lock: block_ref(1, 10),
            other_branch_latest_time: 15,
        };
        let updated = maybe_update_fsi(&mut fsi, block_ref(5, 50), block_ref(6, 60));
        assert!(updated);
        assert_eq!(fsi.lock.block_num, 5);
        assert_eq!(fsi.last_vote.block_num, 6);
        assert_eq!(fsi.other_branch_latest_time, 0);
    }

    #[test]
    fn maybe_update_fsi_is_a_noop_when_not_strictly_newer() {
        let mut fsi = FinalizerSafetyInfo {
            last_vote: block_ref(2, 20),
            lock: block_ref(1, 10),
            other_branch_latest_time: 0,
        };
        let updated = maybe_update_fsi(&mut fsi, block_ref(5, 50), block_ref(1, 5));
        assert!(!updated);
        assert_eq!(fsi.last_vote.block_num, 2);
    }
}
