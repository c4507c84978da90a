//! # Core Domain Entities
//!
//! The value types shared by the object store, block header state,
//! finality core, finalizer, and aggregating QC subsystems.
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, BLS key/signature byte aliases.
//! - **References**: `BlockRef`, `QcClaim`.
//! - **Policies**: `FinalizerPolicy`, `ProposerPolicy`, `FinalizerAuthority`,
//!   `ProducerAuthority`.
//! - **Finalizer safety**: `FinalizerSafetyInfo`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// A compressed BLS12-381 G1 public key.
pub type BlsPublicKeyBytes = [u8; 48];

/// A compressed BLS12-381 G2 signature.
pub type BlsSignatureBytes = [u8; 96];

/// Block height. Monotonically increasing along a chain.
pub type BlockNum = u32;

/// A slot-quantized point in time, expressed as a block-timestamp slot
/// count (not wall-clock seconds) so that comparisons are exact integers.
pub type Slot = u64;

/// The zero digest, used as the `block_ref` placeholder before genesis.
pub const ZERO_HASH: Hash = [0u8; 32];

/// A compact pointer to a past block, sufficient for finalizer safety
/// checks without retaining the full header state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub block_id: Hash,
    pub block_num: BlockNum,
    pub timestamp: Slot,
    pub finality_digest: Hash,
    pub active_policy_generation: u32,
    pub pending_policy_generation: u32,
}

impl BlockRef {
    /// The reference used before any block has been produced.
    pub fn empty() -> Self {
        BlockRef {
            block_id: ZERO_HASH,
            block_num: 0,
            timestamp: 0,
            finality_digest: ZERO_HASH,
            active_policy_generation: 0,
            pending_policy_generation: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block_id == ZERO_HASH && self.timestamp == 0
    }
}

/// A claim, carried in a block header, that a QC was formed on some
/// ancestor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcClaim {
    pub block_num: BlockNum,
    pub is_strong_qc: bool,
}

/// One finalizer's voting authority within a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizerAuthority {
    pub description: String,
    pub weight: u64,
    pub public_key: BlsPublicKeyBytes,
}

/// An immutable set of finalizers and the weight threshold a quorum must
/// meet. `generation` strictly increases across every finalizer policy
/// ever accepted by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizerPolicy {
    pub generation: u64,
    pub threshold: u64,
    pub finalizers: Vec<FinalizerAuthority>,
}

impl FinalizerPolicy {
    pub fn total_weight(&self) -> u64 {
        self.finalizers.iter().map(|f| f.weight).sum()
    }

    /// Derived, not stored: the weak-vote sum above which no strong QC
    /// can subsequently be reached for this block under this policy.
    ///
    /// `total_weight - ceil((total_weight - threshold) * 2)`
    pub fn max_weak_sum_before_weak_final(&self) -> u64 {
        let total = self.total_weight();
        let slack = total.saturating_sub(self.threshold);
        let double_slack = slack.saturating_mul(2);
        total.saturating_sub(double_slack)
    }

    pub fn index_of(&self, key: &BlsPublicKeyBytes) -> Option<usize> {
        self.finalizers.iter().position(|f| &f.public_key == key)
    }
}

/// Shared, reference-counted handle to an immutable finalizer policy.
pub type FinalizerPolicyPtr = Arc<FinalizerPolicy>;

/// One producer's scheduled authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerAuthority {
    pub name: String,
    pub authority: BlsPublicKeyBytes,
}

/// The ordered schedule of block producers. `version` strictly increases
/// across distinct accepted policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerSchedule {
    pub version: u32,
    pub producers: Vec<ProducerAuthority>,
}

/// A proposer policy queued or active at a given proposal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerPolicy {
    pub proposal_time: Slot,
    pub proposer_schedule: ProposerSchedule,
}

pub type ProposerPolicyPtr = Arc<ProposerPolicy>;

/// Per-finalizer persistent safety record. Prevents a byzantine
/// self-contradiction (voting strong on two conflicting branches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizerSafetyInfo {
    pub last_vote: BlockRef,
    pub lock: BlockRef,
    pub other_branch_latest_time: Slot,
}

impl FinalizerSafetyInfo {
    pub fn empty() -> Self {
        FinalizerSafetyInfo {
            last_vote: BlockRef::empty(),
            lock: BlockRef::empty(),
            other_branch_latest_time: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_vote.is_empty() && self.lock.is_empty()
    }
}

/// An opaque identifier for an activated protocol feature.
pub type ProtocolFeatureId = Hash;

/// A strict-monotone, append-only set of activated protocol features,
/// forked by copy-and-append rather than shared in place. See the
/// open-question resolution in DESIGN.md for why this is `Arc<Vec<_>>`
/// rather than a persistent hash set.
pub type ProtocolFeatureActivationSet = Arc<Vec<ProtocolFeatureId>>;

/// Whether a cast vote counts toward the strong or weak quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteStrength {
    Strong,
    Weak,
}

/// A single finalizer's vote on a block, as received off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizerVote {
    pub block_num: BlockNum,
    pub finalizer_public_key: BlsPublicKeyBytes,
    pub strength: VoteStrength,
    pub signature: BlsSignatureBytes,
}
