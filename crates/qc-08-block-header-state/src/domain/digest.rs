//! `base_digest` and `finality_digest` computation.
//!
//! Reference: spec.md §4.2.3. Every optional field is encoded behind an
//! explicit presence byte (`0x00`/`0x01`) rather than being folded into
//! the hash only when present, so a present-vs-absent distinction can
//! never collide with two different absent fields.

use serde::Serialize;
use shared_crypto::hashing::sha256;
use shared_types::Hash;

use crate::domain::header::BlockHeader;
use crate::domain::policy::{ProposedFinalizerPolicy, ProposerPolicyQueue};

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("digest input is always serializable")
}

fn encode_presence<T: Serialize>(value: &Option<T>) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Some(v) => {
            out.push(1u8);
            out.extend(encode(v));
        }
        None => out.push(0u8),
    }
    out
}

/// `base_digest = SHA256(header, core.pack_for_digest, proposed_finalizer_policies,
/// pending_finalizer_policy, active_proposer_policy, latest_proposed_proposer_policy,
/// latest_pending_proposer_policy, activated_protocol_features)`.
#[allow(clippy::too_many_arguments)]
pub fn base_digest(
    header: &BlockHeader,
    core_packed: &[u8],
    proposed_finalizer_policies: &[ProposedFinalizerPolicy],
    pending_finalizer_policy: &Option<crate::domain::policy::PendingFinalizerPolicy>,
    proposer_queue: &ProposerPolicyQueue,
    activated_protocol_features: &shared_types::ProtocolFeatureActivationSet,
) -> Hash {
    let mut buf = Vec::new();
    buf.extend(encode(header));
    buf.extend(core_packed);
    buf.extend(encode(proposed_finalizer_policies));
    buf.extend(encode_presence(pending_finalizer_policy));
    buf.extend(encode(proposer_queue.active.as_ref()));
    buf.extend(encode_presence(&proposer_queue.latest_proposed));
    buf.extend(encode_presence(&proposer_queue.latest_pending));
    buf.extend(encode(activated_protocol_features.as_ref()));
    sha256(&buf)
}

/// Inputs for the three nested digest levels of `finality_digest`.
pub struct FinalityDigestInput<'a> {
    pub active_finalizer_policy_generation: u64,
    pub last_pending_finalizer_policy_generation: u64,
    pub finality_mroot: Hash,
    pub last_pending_fin_pol_digest: Hash,
    pub last_pending_fin_pol_start_timestamp: shared_types::Slot,
    pub reversible_blocks_mroot: Hash,
    pub latest_qc_claim_block_num: shared_types::BlockNum,
    pub latest_qc_claim_finality_digest: Hash,
    pub latest_qc_claim_timestamp: shared_types::Slot,
    pub timestamp: shared_types::Slot,
    pub base_digest: &'a Hash,
}

/// `finality_digest = SHA256(active_gen, last_pending_gen, finality_mroot,
/// SHA256(level_2))` where `level_2 = { last_pending_fin_pol_digest,
/// last_pending_fin_pol_start_timestamp, SHA256(level_3) }` and
/// `level_3 = { reversible_blocks_mroot, latest_qc_claim_block_num,
/// latest_qc_claim_finality_digest, latest_qc_claim_timestamp, timestamp,
/// base_digest }`.
pub fn finality_digest(input: &FinalityDigestInput) -> Hash {
    let level_3 = {
        let mut buf = Vec::new();
        buf.extend(encode(&input.reversible_blocks_mroot));
        buf.extend(encode(&input.latest_qc_claim_block_num));
        buf.extend(encode(&input.latest_qc_claim_finality_digest));
        buf.extend(encode(&input.latest_qc_claim_timestamp));
        buf.extend(encode(&input.timestamp));
        buf.extend(encode(input.base_digest));
        sha256(&buf)
    };

    let level_2 = {
        let mut buf = Vec::new();
        buf.extend(encode(&input.last_pending_fin_pol_digest));
        buf.extend(encode(&input.last_pending_fin_pol_start_timestamp));
        buf.extend(level_3);
        sha256(&buf)
    };

    let mut buf = Vec::new();
    buf.extend(encode(&input.active_finalizer_policy_generation));
    buf.extend(encode(&input.last_pending_finalizer_policy_generation));
    buf.extend(encode(&input.finality_mroot));
    buf.extend(level_2);
    sha256(&buf)
}

/// `SHA256(finality_digest || "WEAK")`, the digest a weak vote signs.
pub fn weak_vote_digest(finality_digest: &Hash) -> Hash {
    shared_crypto::hashing::sha256_with_suffix(finality_digest, b"WEAK")
}

pub fn digest_of<T: Serialize>(value: &T) -> Hash {
    sha256(&encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_digest_differs_from_strong() {
        let strong = [7u8; 32];
        assert_ne!(weak_vote_digest(&strong), strong);
    }

    #[test]
    fn finality_digest_is_deterministic() {
        let base = [1u8; 32];
        let input = FinalityDigestInput {
            active_finalizer_policy_generation: 1,
            last_pending_finalizer_policy_generation: 1,
            finality_mroot: [2u8; 32],
            last_pending_fin_pol_digest: [3u8; 32],
            last_pending_fin_pol_start_timestamp: 0,
            reversible_blocks_mroot: [4u8; 32],
            latest_qc_claim_block_num: 5,
            latest_qc_claim_finality_digest: [6u8; 32],
            latest_qc_claim_timestamp: 7,
            timestamp: 8,
            base_digest: &base,
        };
        let a = finality_digest(&input);
        let b = finality_digest(&input);
        assert_eq!(a, b);
    }
}
