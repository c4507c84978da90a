//! Validation of an incoming `Qc`: shape/weight/dual-finalizer checks
//! that need no cryptography, and the BLS signature check that does.
//!
//! Reference: spec.md §4.5, §7; grounded on
//! `original_source/libraries/chain/qc.cpp`'s `qc_t::verify_basic`,
//! `qc_t::verify_signatures`, `qc_sig_t::verify_vote_format`,
//! `qc_sig_t::verify_weights`, `qc_sig_t::verify_signatures`, and
//! `verify_dual_finalizers_votes`.

use shared_crypto::{hashing, BlsPublicKey, BlsSignature};
use shared_types::FinalizerPolicy;

use crate::domain::entities::{Qc, QcSig};
use crate::error::{QcError, QcResult};

const WEAK_SUFFIX: &[u8] = b"WEAK";

/// `sha256(finality_digest || "WEAK")` — the digest finalizers sign when
/// casting a weak vote (spec.md §1 glossary, "weak digest").
pub fn weak_digest(finality_digest: &[u8; 32]) -> [u8; 32] {
    hashing::sha256_with_suffix(finality_digest, WEAK_SUFFIX)
}

/// Shape, weight, and dual-finalizer checks — no cryptography. Must pass
/// before `verify_signatures` is even attempted.
pub fn verify_basic(qc: &Qc, active_policy: &FinalizerPolicy, pending_policy: Option<&FinalizerPolicy>) -> QcResult<()> {
    verify_vote_format(&qc.active_policy_sig, active_policy)?;
    verify_weights(&qc.active_policy_sig, active_policy)?;

    match (&qc.pending_policy_sig, pending_policy) {
        (Some(pending_sig), Some(pending_policy)) => {
            verify_dual_finalizers_votes(active_policy, &qc.active_policy_sig, pending_policy, pending_sig)?;
            verify_vote_format(pending_sig, pending_policy)?;
            verify_weights(pending_sig, pending_policy)?;
            Ok(())
        }
        (None, None) => Ok(()),
        (Some(_), None) => Err(QcError::InvalidQc(format!(
            "qc {} contains a pending policy signature for a nonexistent pending finalizer policy",
            qc.block_num
        ))),
        (None, Some(_)) => Err(QcError::InvalidQc(format!(
            "qc {} does not contain a pending policy signature for the pending finalizer policy",
            qc.block_num
        ))),
    }
}

/// A dual finalizer (one present in both the active and pending policy)
/// must have voted identically in both.
fn verify_dual_finalizers_votes(
    active_policy: &FinalizerPolicy,
    active_sig: &QcSig,
    pending_policy: &FinalizerPolicy,
    pending_sig: &QcSig,
) -> QcResult<()> {
    for (active_index, active_fin) in active_policy.finalizers.iter().enumerate() {
        if let Some(pending_index) = pending_policy.index_of(&active_fin.public_key) {
            if !active_sig.vote_same_at(pending_sig, active_index, pending_index) {
                return Err(QcError::InvalidQc(format!(
                    "dual finalizer at active index {active_index} voted differently on the active and pending policies"
                )));
            }
        }
    }
    Ok(())
}

fn verify_vote_format(sig: &QcSig, policy: &FinalizerPolicy) -> QcResult<()> {
    if sig.strong_votes.is_none() && sig.weak_votes.is_none() {
        return Err(QcError::InvalidQc(format!(
            "neither strong_votes nor weak_votes present for finalizer policy generation {}",
            policy.generation
        )));
    }

    let num_finalizers = policy.finalizers.len();
    if let Some(strong) = &sig.strong_votes {
        if strong.len() != num_finalizers {
            return Err(QcError::InvalidQc(format!(
                "strong vote bitset size {} does not match {num_finalizers} finalizers",
                strong.len()
            )));
        }
    }
    if let Some(weak) = &sig.weak_votes {
        if weak.len() != num_finalizers {
            return Err(QcError::InvalidQc(format!(
                "weak vote bitset size {} does not match {num_finalizers} finalizers",
                weak.len()
            )));
        }
    }

    if let (Some(strong), Some(weak)) = (&sig.strong_votes, &sig.weak_votes) {
        for i in 0..strong.len() {
            if strong[i] && weak[i] {
                return Err(QcError::InvalidQc(format!("finalizer at bit index {i} voted both strong and weak")));
            }
        }
    }
    Ok(())
}

fn verify_weights(sig: &QcSig, policy: &FinalizerPolicy) -> QcResult<()> {
    let weight_sum = |votes: &Option<crate::domain::entities::VoteBitset>| -> u64 {
        votes
            .as_ref()
            .map(|bits| {
                policy
                    .finalizers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| bits[*i])
                    .map(|(_, f)| f.weight)
                    .sum()
            })
            .unwrap_or(0)
    };

    let strong_weight = weight_sum(&sig.strong_votes);
    let weak_weight = weight_sum(&sig.weak_votes);

    if sig.is_strong() {
        if strong_weight < policy.threshold {
            return Err(QcError::InvalidQc(format!(
                "strong quorum not met: strong weight {strong_weight}, threshold {}",
                policy.threshold
            )));
        }
    } else if strong_weight + weak_weight < policy.threshold {
        return Err(QcError::InvalidQc(format!(
            "weak quorum not met: strong weight {strong_weight}, weak weight {weak_weight}, threshold {}",
            policy.threshold
        )));
    }
    Ok(())
}

/// BLS signature verification against the block's finality digest (for
/// strong votes) and its derived weak digest (for weak votes). Must only
/// be called after `verify_basic` has passed.
pub fn verify_signatures(qc: &Qc, finality_digest: &[u8; 32], active_policy: &FinalizerPolicy, pending_policy: Option<&FinalizerPolicy>) -> QcResult<()> {
    let weak = weak_digest(finality_digest);
    verify_sig(&qc.active_policy_sig, active_policy, finality_digest, &weak)?;

    if let (Some(pending_sig), Some(pending_policy)) = (&qc.pending_policy_sig, pending_policy) {
        verify_sig(pending_sig, pending_policy, finality_digest, &weak)?;
    }
    Ok(())
}

fn verify_sig(sig: &QcSig, policy: &FinalizerPolicy, strong_digest: &[u8; 32], weak_digest: &[u8; 32]) -> QcResult<()> {
    let aggregate_pubkeys = |votes: &crate::domain::entities::VoteBitset| -> QcResult<BlsPublicKey> {
        let keys: Vec<BlsPublicKey> = policy
            .finalizers
            .iter()
            .enumerate()
            .filter(|(i, _)| votes[*i])
            .map(|(_, f)| BlsPublicKey::from_bytes(&f.public_key))
            .collect::<Result<_, _>>()?;
        Ok(BlsPublicKey::aggregate(&keys)?)
    };

    let mut pairs_owned: Vec<(BlsPublicKey, &[u8])> = Vec::with_capacity(2);
    if let Some(strong_votes) = &sig.strong_votes {
        pairs_owned.push((aggregate_pubkeys(strong_votes)?, strong_digest.as_slice()));
    }
    if let Some(weak_votes) = &sig.weak_votes {
        pairs_owned.push((aggregate_pubkeys(weak_votes)?, weak_digest.as_slice()));
    }

    let pairs: Vec<(&BlsPublicKey, &[u8])> = pairs_owned.iter().map(|(pk, d)| (pk, *d)).collect();
    let aggregate_sig = BlsSignature::from_bytes(&sig.signature)?;
    if !aggregate_sig.aggregate_verify(&pairs) {
        return Err(QcError::InvalidQcSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::VoteBitset;
    use shared_crypto::BlsKeyPair;
    use shared_types::FinalizerAuthority;

    fn policy(keys: &[BlsKeyPair], threshold: u64) -> FinalizerPolicy {
        FinalizerPolicy {
            generation: 1,
            threshold,
            finalizers: keys
                .iter()
                .map(|kp| FinalizerAuthority { description: String::new(), weight: 1, public_key: kp.public_key().to_bytes() })
                .collect(),
        }
    }

    #[test]
    fn verify_basic_rejects_missing_pending_signature() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let pending = policy(&keys, 2);
        let qc = Qc {
            block_num: 1,
            active_policy_sig: QcSig { strong_votes: Some(VoteBitset::repeat(true, 2)), weak_votes: None, signature: [0u8; 96] },
            pending_policy_sig: None,
        };
        assert!(verify_basic(&qc, &active, Some(&pending)).is_err());
    }

    #[test]
    fn verify_basic_rejects_double_vote_in_one_bitset() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 1);
        let mut strong = VoteBitset::repeat(false, 2);
        strong.set(0, true);
        let mut weak = VoteBitset::repeat(false, 2);
        weak.set(0, true);
        let qc = Qc {
            block_num: 1,
            active_policy_sig: QcSig { strong_votes: Some(strong), weak_votes: Some(weak), signature: [0u8; 96] },
            pending_policy_sig: None,
        };
        assert!(verify_basic(&qc, &active, None).is_err());
    }

    #[test]
    fn verify_signatures_accepts_a_genuine_strong_aggregate() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let finality_digest = [7u8; 32];

        let sigs: Vec<_> = keys.iter().map(|kp| kp.sign(&finality_digest)).collect();
        let aggregate = BlsSignature::aggregate(&sigs).unwrap();

        let qc = Qc {
            block_num: 1,
            active_policy_sig: QcSig {
                strong_votes: Some(VoteBitset::repeat(true, 2)),
                weak_votes: None,
                signature: aggregate.to_bytes(),
            },
            pending_policy_sig: None,
        };
        verify_basic(&qc, &active, None).unwrap();
        verify_signatures(&qc, &finality_digest, &active, None).unwrap();
    }

    #[test]
    fn verify_signatures_rejects_a_forged_aggregate() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let finality_digest = [7u8; 32];
        let wrong_digest = [9u8; 32];

        let sigs: Vec<_> = keys.iter().map(|kp| kp.sign(&wrong_digest)).collect();
        let aggregate = BlsSignature::aggregate(&sigs).unwrap();

        let qc = Qc {
            block_num: 1,
            active_policy_sig: QcSig {
                strong_votes: Some(VoteBitset::repeat(true, 2)),
                weak_votes: None,
                signature: aggregate.to_bytes(),
            },
            pending_policy_sig: None,
        };
        assert!(verify_signatures(&qc, &finality_digest, &active, None).is_err());
    }
}
