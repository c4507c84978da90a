//! Top-level aggregating QC: the active/pending pair of per-policy
//! aggregators, wired together the way `aggregating_qc_t` routes a single
//! incoming vote to both at once.
//!
//! Reference: spec.md §4.5, §6 "QC extension on block"; grounded on
//! `original_source/libraries/chain/qc.cpp`'s `aggregating_qc_t`
//! (`aggregate_vote`, `get_best_qc`, `has_voted`, `vote_metrics`).

use shared_crypto::{BlsPublicKey, BlsSignature};
use shared_types::{BlockNum, BlsPublicKeyBytes, BlsSignatureBytes, FinalizerPolicyPtr};

use crate::domain::aggregator::AggregatingQcSig;
use crate::domain::entities::{Qc, QcSig, VoteStatus};
use crate::error::{QcError, QcResult};

/// Outcome of routing one vote to the active and (if present) pending
/// policy aggregators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Recorded against at least one policy.
    Accepted,
    /// The finalizer key is not in the active policy (and, if present,
    /// not in the pending policy either).
    UnknownPublicKey,
    /// Already recorded for every policy the key appears in.
    Duplicate,
}

/// One finalizer's vote on a block: which policy digest(s) it signs are
/// determined by the aggregator it is routed to, not carried here.
pub struct IncomingVote {
    pub finalizer_key: BlsPublicKeyBytes,
    pub strong: bool,
    pub signature: BlsSignatureBytes,
    /// The digest the finalizer signed: the block's finality digest when
    /// `strong`, or `sha256(finality_digest || "WEAK")` otherwise. Computed
    /// by the caller (component B/C owns digest derivation).
    pub signed_digest: [u8; 32],
}

/// The pair of per-policy aggregators backing one block's QC, plus the
/// policies themselves (needed to resolve a finalizer key to an index).
pub struct AggregatingQc {
    active_policy: FinalizerPolicyPtr,
    pending_policy: Option<FinalizerPolicyPtr>,
    active_policy_sig: AggregatingQcSig,
    pending_policy_sig: Option<AggregatingQcSig>,
}

impl AggregatingQc {
    pub fn new(active_policy: FinalizerPolicyPtr, pending_policy: Option<FinalizerPolicyPtr>) -> Self {
        let active_policy_sig = AggregatingQcSig::from_policy(&active_policy);
        let pending_policy_sig = pending_policy.as_ref().map(|p| AggregatingQcSig::from_policy(p));
        AggregatingQc { active_policy, pending_policy, active_policy_sig, pending_policy_sig }
    }

    /// Route one vote to the active policy and, if a pending policy
    /// exists, the pending policy too, verifying the BLS signature at
    /// most once regardless of how many policies the finalizer sits in.
    ///
    /// A finalizer absent from both policies returns `UnknownPublicKey`;
    /// present in at least one but already recorded there returns
    /// `Duplicate` only if it was a duplicate in every policy it appears
    /// in — a finalizer that is new in the pending policy but has already
    /// voted in the active one is still routed to the pending aggregator.
    pub fn aggregate_vote(&self, vote: &IncomingVote) -> QcResult<VoteOutcome> {
        let mut verified = false;
        let mut any_known = false;
        let mut any_accepted = false;
        let mut any_duplicate = false;

        let mut route = |policy: &FinalizerPolicyPtr, agg: &AggregatingQcSig| -> QcResult<()> {
            let Some(index) = policy.index_of(&vote.finalizer_key) else {
                return Ok(());
            };
            any_known = true;
            if agg.has_voted(index) {
                any_duplicate = true;
                return Ok(());
            }
            if !verified {
                let pk = BlsPublicKey::from_bytes(&vote.finalizer_key)?;
                let sig = BlsSignature::from_bytes(&vote.signature)?;
                if !pk.verify(&vote.signed_digest, &sig) {
                    return Err(QcError::InvalidQcSignature);
                }
                verified = true;
            }
            let weight = policy.finalizers[index].weight;
            match agg.add_vote(index, vote.strong, &vote.signature, weight)? {
                crate::domain::aggregator::AddVoteOutcome::Added => any_accepted = true,
                crate::domain::aggregator::AddVoteOutcome::Duplicate => any_duplicate = true,
            }
            Ok(())
        };

        route(&self.active_policy, &self.active_policy_sig)?;
        if let (Some(policy), Some(agg)) = (&self.pending_policy, &self.pending_policy_sig) {
            route(policy, agg)?;
        }

        if !any_known {
            return Ok(VoteOutcome::UnknownPublicKey);
        }
        if any_accepted {
            return Ok(VoteOutcome::Accepted);
        }
        if any_duplicate {
            return Ok(VoteOutcome::Duplicate);
        }
        Ok(VoteOutcome::UnknownPublicKey)
    }

    /// The best QC for this block: `None` if the active policy has not
    /// reached quorum, or if a pending policy exists but hasn't either
    /// (the original's "no quorum on pending_policy_sig so no qc for this
    /// block").
    pub fn get_best_qc(&self, block_num: BlockNum) -> Option<Qc> {
        let active_best = self.active_policy_sig.get_best_qc()?;
        match &self.pending_policy_sig {
            None => Some(Qc { block_num, active_policy_sig: active_best, pending_policy_sig: None }),
            Some(pending_agg) => {
                let pending_best = pending_agg.get_best_qc()?;
                Some(Qc { block_num, active_policy_sig: active_best, pending_policy_sig: Some(pending_best) })
            }
        }
    }

    /// Record an externally received QC as a `get_best_qc` candidate.
    /// Returns whether either policy's candidate was replaced.
    pub fn set_received_qc(&self, qc: &Qc) -> QcResult<bool> {
        if self.pending_policy_sig.is_some() != qc.pending_policy_sig.is_some() {
            return Err(QcError::InvalidQc(format!(
                "qc {} pending-policy-signature presence does not match this aggregator",
                qc.block_num
            )));
        }
        let active_better = self.active_policy_sig.set_received_qc_sig(qc.active_policy_sig.clone());
        let pending_better = match (&self.pending_policy_sig, &qc.pending_policy_sig) {
            (Some(agg), Some(sig)) => agg.set_received_qc_sig(sig.clone()),
            _ => false,
        };
        Ok(active_better || pending_better)
    }

    /// True iff the best-known QC is strong in every policy it covers.
    pub fn received_qc_is_strong(&self) -> bool {
        match &self.pending_policy_sig {
            None => self.active_policy_sig.received_qc_sig_is_strong(),
            Some(pending) => {
                self.active_policy_sig.received_qc_sig_is_strong() && pending.received_qc_sig_is_strong()
            }
        }
    }

    /// Whether `key` has voted, not voted, or does not appear in either
    /// policy. A key present only in the pending policy but not yet
    /// voted there still reports `NotVoted` rather than falling through
    /// to the active policy's status, per the original's precedence.
    pub fn has_voted(&self, key: &BlsPublicKeyBytes) -> VoteStatus {
        let active_status = match self.active_policy.index_of(key) {
            Some(index) => {
                if self.active_policy_sig.has_voted(index) {
                    VoteStatus::Voted
                } else {
                    VoteStatus::NotVoted
                }
            }
            None => VoteStatus::IrrelevantFinalizer,
        };

        let Some(pending_policy) = &self.pending_policy else {
            return active_status;
        };
        if active_status == VoteStatus::NotVoted {
            return active_status;
        }

        let pending_sig = self.pending_policy_sig.as_ref().expect("pending policy implies pending sig");
        let pending_status = match pending_policy.index_of(key) {
            Some(index) => {
                if pending_sig.has_voted(index) {
                    VoteStatus::Voted
                } else {
                    VoteStatus::NotVoted
                }
            }
            None => VoteStatus::IrrelevantFinalizer,
        };

        if pending_status == VoteStatus::IrrelevantFinalizer {
            active_status
        } else {
            pending_status
        }
    }

    /// Finalizers from either policy that have not yet voted on this QC,
    /// used by telemetry to report which authorities are holding up a
    /// quorum. Grounded on `aggregating_qc_t::missing_votes`.
    pub fn missing_votes(&self) -> Vec<BlsPublicKeyBytes> {
        let mut missing = Vec::new();
        for (index, finalizer) in self.active_policy.finalizers.iter().enumerate() {
            if !self.active_policy_sig.has_voted(index) {
                missing.push(finalizer.public_key);
            }
        }
        if let (Some(policy), Some(sig)) = (&self.pending_policy, &self.pending_policy_sig) {
            for (index, finalizer) in policy.finalizers.iter().enumerate() {
                if !sig.has_voted(index) && !missing.contains(&finalizer.public_key) {
                    missing.push(finalizer.public_key);
                }
            }
        }
        missing
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
                .enumerate()
                .map(|(i, kp)| FinalizerAuthority {
                    description: format!("finalizer-{i}"),
                    weight: 1,
                    public_key: kp.public_key().to_bytes(),
                })
                .collect(),
        })
    }

    #[test]
    fn aggregate_vote_rejects_unknown_finalizer() {
        let keys: Vec<_> = (0..3).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let agg = AggregatingQc::new(active, None);

        let outsider = BlsKeyPair::generate();
        let digest = b"finality digest.................";
        let sig = outsider.sign(digest);
        let vote = IncomingVote {
            finalizer_key: outsider.public_key().to_bytes(),
            strong: true,
            signature: sig.to_bytes(),
            signed_digest: *digest,
        };
        assert_eq!(agg.aggregate_vote(&vote).unwrap(), VoteOutcome::UnknownPublicKey);
    }

    #[test]
    fn aggregate_vote_routes_to_both_policies_and_reaches_quorum() {
        let active_keys: Vec<_> = (0..3).map(|_| BlsKeyPair::generate()).collect();
        let shared_finalizer = BlsKeyPair::from_secret_bytes(&active_keys[0].secret_bytes()).unwrap();
        let pending_keys: Vec<_> = vec![shared_finalizer, BlsKeyPair::generate()];
        let active = policy(&active_keys, 2);
        let pending = policy(&pending_keys, 2);
        let agg = AggregatingQc::new(active, Some(pending));

        let digest = b"finality digest.................";
        for kp in active_keys.iter().take(2) {
            let sig = kp.sign(digest);
            let vote = IncomingVote {
                finalizer_key: kp.public_key().to_bytes(),
                strong: true,
                signature: sig.to_bytes(),
                signed_digest: *digest,
            };
            agg.aggregate_vote(&vote).unwrap();
        }
        assert!(agg.get_best_qc(10).is_none(), "pending policy has not reached quorum yet");

        let second_pending = &pending_keys[1];
        let sig = second_pending.sign(digest);
        let vote = IncomingVote {
            finalizer_key: second_pending.public_key().to_bytes(),
            strong: true,
            signature: sig.to_bytes(),
            signed_digest: *digest,
        };
        agg.aggregate_vote(&vote).unwrap();

        let qc = agg.get_best_qc(10).expect("both policies now have quorum");
        assert_eq!(qc.block_num, 10);
        assert!(qc.active_policy_sig.is_strong());
        assert!(qc.pending_policy_sig.unwrap().is_strong());
    }

    #[test]
    fn has_voted_reports_irrelevant_for_a_key_in_neither_policy() {
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let active = policy(&keys, 2);
        let agg = AggregatingQc::new(active, None);
        let outsider = BlsKeyPair::generate();
        assert_eq!(agg.has_voted(&outsider.public_key().to_bytes()), VoteStatus::IrrelevantFinalizer);
    }
}
