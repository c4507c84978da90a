//! The assembled block header and its `finality_extension`.
//!
//! Reference: spec.md §4.2 step 1 and §6 "Header extension encoding".

use serde::{Deserialize, Serialize};
use shared_types::{Hash, ProducerAuthority, QcClaim, Slot, ZERO_HASH};

use crate::domain::policy::{FinalizerPolicyDiff, ProposerPolicyDiff};

/// Fixed `schedule_version` Savanna stamps on every header; the legacy
/// field is otherwise unused once Savanna is active.
pub const SAVANNA_SCHEDULE_VERSION_CONSTANT: u32 = u32::MAX;

/// The caller-supplied inputs to one `next()` derivation step.
#[derive(Debug, Clone)]
pub struct HeaderInput {
    pub timestamp: Slot,
    pub producer: ProducerAuthority,
    pub parent_id: Hash,
    pub transaction_mroot: Hash,
    pub finality_mroot_claim: Hash,
    pub qc_claim: QcClaim,
    pub new_finalizer_policy_diff: Option<FinalizerPolicyDiff>,
    pub new_proposer_policy_diff: Option<ProposerPolicyDiff>,
    pub new_protocol_feature_activations: Vec<shared_types::ProtocolFeatureId>,
}

/// The assembled, to-be-hashed block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub timestamp: Slot,
    pub producer: ProducerAuthority,
    pub previous: Hash,
    pub confirmed: u32,
    pub transaction_mroot: Hash,
    pub action_mroot: Hash,
    pub schedule_version: u32,
    pub finality_extension: FinalityExtension,
}

impl BlockHeader {
    pub fn new(input: &HeaderInput, extension: FinalityExtension) -> Self {
        BlockHeader {
            timestamp: input.timestamp,
            producer: input.producer.clone(),
            previous: input.parent_id,
            confirmed: 0,
            transaction_mroot: input.transaction_mroot,
            action_mroot: input.finality_mroot_claim,
            schedule_version: SAVANNA_SCHEDULE_VERSION_CONSTANT,
            finality_extension: extension,
        }
    }

    /// Zero-mroot header used by validation to compare against a genesis
    /// claim (spec.md §4.2.4).
    pub fn action_mroot_is_empty(&self) -> bool {
        self.action_mroot == ZERO_HASH
    }
}

/// The `finality_extension` carried by every Savanna block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityExtension {
    pub qc_claim: QcClaim,
    pub new_finalizer_policy_diff: Option<FinalizerPolicyDiff>,
    pub new_proposer_policy_diff: Option<ProposerPolicyDiff>,
}
