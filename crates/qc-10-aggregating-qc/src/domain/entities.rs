//! Wire-level quorum-certificate shapes.
//!
//! Reference: spec.md §3 "Aggregating QC signature (per-policy)", §6
//! "QC extension on block"; grounded on
//! `original_source/include/eosio/chain/qc.hpp`'s `qc_sig_t`/`qc_t`.

use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use shared_types::{BlockNum, BlsSignatureBytes};

/// A finalizer-indexed vote bitset, one bit per finalizer in a policy's
/// `finalizers` list, in order.
pub type VoteBitset = BitVec<u8, Lsb0>;

/// The signature portion of a QC for a single finalizer policy: which
/// finalizers voted strong, which voted weak, and the aggregate BLS
/// signature covering both digests. At least one of `strong_votes`/
/// `weak_votes` must be present for a well-formed QC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcSig {
    pub strong_votes: Option<VoteBitset>,
    pub weak_votes: Option<VoteBitset>,
    pub signature: BlsSignatureBytes,
}

impl QcSig {
    pub fn is_strong(&self) -> bool {
        self.strong_votes.is_some() && self.weak_votes.is_none()
    }

    pub fn is_weak(&self) -> bool {
        !self.is_strong()
    }

    /// True iff `self` and `other` recorded the same vote (strong, weak,
    /// or absent) at their respective indexes. Used by the dual-finalizer
    /// invariant, which compares a finalizer's vote across the active and
    /// pending policies where it may sit at different indexes.
    pub fn vote_same_at(&self, other: &QcSig, my_index: usize, other_index: usize) -> bool {
        let bit = |votes: &Option<VoteBitset>, idx: usize| votes.as_ref().is_some_and(|b| b[idx]);
        let same_strong = bit(&self.strong_votes, my_index) == bit(&other.strong_votes, other_index);
        let same_weak = bit(&self.weak_votes, my_index) == bit(&other.weak_votes, other_index);
        same_strong && same_weak
    }
}

/// A full QC for one block: the active policy's signature, plus the
/// pending policy's signature if a pending finalizer policy existed at
/// the time the QC was formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qc {
    pub block_num: BlockNum,
    pub active_policy_sig: QcSig,
    pub pending_policy_sig: Option<QcSig>,
}

/// Whether a given finalizer key voted, did not vote, or does not
/// appear in the relevant policy at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    Voted,
    NotVoted,
    IrrelevantFinalizer,
}
