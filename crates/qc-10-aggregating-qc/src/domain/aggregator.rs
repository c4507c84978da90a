//! Per-policy aggregating QC signature: the online BLS-signature
//! accumulator and its strong/weak state machine.
//!
//! Reference: spec.md §4.5; grounded on
//! `original_source/libraries/chain/qc.cpp`'s `aggregating_qc_sig_t`
//! (`add_strong_vote`/`add_weak_vote`/`get_best_qc`/
//! `extract_qc_sig_from_aggregating`).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::entities::VoteBitset;
use parking_lot::Mutex;
use shared_crypto::BlsSignature;
use shared_types::{BlsSignatureBytes, FinalizerPolicy};

use crate::domain::entities::QcSig;
use crate::error::QcResult;

/// `state_t` — monotone in the partial order
/// `unrestricted < restricted < {weak_achieved, weak_final} < strong`.
/// Transitions never go backwards (spec.md §5, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatingState {
    Unrestricted,
    Restricted,
    WeakAchieved,
    WeakFinal,
    Strong,
}

impl AggregatingState {
    pub fn is_quorum_met(self) -> bool {
        matches!(self, AggregatingState::WeakAchieved | AggregatingState::WeakFinal | AggregatingState::Strong)
    }
}

/// Outcome of a single `add_vote` call once past the duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddVoteOutcome {
    Added,
    Duplicate,
}

struct Inner {
    strong_bitset: VoteBitset,
    weak_bitset: VoteBitset,
    strong_sig: Option<BlsSignature>,
    weak_sig: Option<BlsSignature>,
    strong_sum: u64,
    weak_sum: u64,
    state: AggregatingState,
    received_qc_sig: Option<QcSig>,
}

/// Accumulates strong/weak BLS votes for one finalizer policy (active or
/// pending) until quorum, tracking the best QC this process has either
/// assembled itself or received from the network.
///
/// A single mutex guards all mutation (spec.md §5); `has_voted` is
/// answerable lock-free via a per-finalizer atomic flag so a vote
/// receiver can cheaply discard an already-seen finalizer before paying
/// for a BLS `aggregate_verify` or contending for the mutex.
pub struct AggregatingQcSig {
    num_finalizers: usize,
    quorum: u64,
    max_weak_sum_before_weak_final: u64,
    processed: Vec<AtomicBool>,
    inner: Mutex<Inner>,
}

impl AggregatingQcSig {
    pub fn new(num_finalizers: usize, quorum: u64, max_weak_sum_before_weak_final: u64) -> Self {
        AggregatingQcSig {
            num_finalizers,
            quorum,
            max_weak_sum_before_weak_final,
            processed: (0..num_finalizers).map(|_| AtomicBool::new(false)).collect(),
            inner: Mutex::new(Inner {
                strong_bitset: VoteBitset::repeat(false, num_finalizers),
                weak_bitset: VoteBitset::repeat(false, num_finalizers),
                strong_sig: None,
                weak_sig: None,
                strong_sum: 0,
                weak_sum: 0,
                state: AggregatingState::Unrestricted,
                received_qc_sig: None,
            }),
        }
    }

    pub fn from_policy(policy: &FinalizerPolicy) -> Self {
        Self::new(policy.finalizers.len(), policy.threshold, policy.max_weak_sum_before_weak_final())
    }

    /// Lock-free: true iff this finalizer index has already voted strong
    /// or weak.
    pub fn has_voted(&self, index: usize) -> bool {
        self.processed[index].load(Ordering::Relaxed)
    }

    pub fn state(&self) -> AggregatingState {
        self.inner.lock().state
    }

    pub fn is_quorum_met(&self) -> bool {
        self.inner.lock().state.is_quorum_met()
    }

    /// Record one finalizer's vote. `weight` is the finalizer's weight
    /// under the policy this aggregator was built from.
    pub fn add_vote(&self, index: usize, strong: bool, sig: &BlsSignatureBytes, weight: u64) -> QcResult<AddVoteOutcome> {
        let signature = BlsSignature::from_bytes(sig)?;
        let mut inner = self.inner.lock();

        if inner.strong_bitset[index] || inner.weak_bitset[index] {
            return Ok(AddVoteOutcome::Duplicate);
        }

        if strong {
            inner.strong_bitset.set(index, true);
            inner.strong_sum += weight;
            inner.strong_sig = Some(match inner.strong_sig.take() {
                Some(acc) => BlsSignature::aggregate(&[acc, signature])?,
                None => signature,
            });
            inner.state = next_state_after_strong_vote(inner.state, inner.strong_sum, inner.weak_sum, self.quorum);
        } else {
            inner.weak_bitset.set(index, true);
            inner.weak_sum += weight;
            inner.weak_sig = Some(match inner.weak_sig.take() {
                Some(acc) => BlsSignature::aggregate(&[acc, signature])?,
                None => signature,
            });
            inner.state = next_state_after_weak_vote(
                inner.state,
                inner.strong_sum,
                inner.weak_sum,
                self.quorum,
                self.max_weak_sum_before_weak_final,
            );
        }

        self.processed[index].store(true, Ordering::Relaxed);
        Ok(AddVoteOutcome::Added)
    }

    /// Extract the QC signature from this aggregator's own accumulated
    /// votes. Only valid once quorum has been met; an implementation that
    /// calls this before quorum has a bug in the state machine the spec
    /// says can never happen (the original's `assert(0)`).
    pub fn extract_qc_sig(&self) -> QcSig {
        let inner = self.inner.lock();
        match inner.state {
            AggregatingState::Strong => QcSig {
                strong_votes: Some(inner.strong_bitset.clone()),
                weak_votes: None,
                signature: inner.strong_sig.as_ref().expect("strong state implies a strong signature").to_bytes(),
            },
            _ if inner.state.is_quorum_met() => {
                let strong_sig = inner.strong_sig.clone();
                let combined = match (strong_sig, inner.weak_sig.clone()) {
                    (Some(s), Some(w)) => BlsSignature::aggregate(&[s, w]).expect("two valid sigs always aggregate"),
                    (Some(s), None) => s,
                    (None, Some(w)) => w,
                    (None, None) => unreachable!("quorum met implies at least one vote was recorded"),
                };
                QcSig {
                    strong_votes: Some(inner.strong_bitset.clone()),
                    weak_votes: Some(inner.weak_bitset.clone()),
                    signature: combined.to_bytes(),
                }
            }
            _ => unreachable!("extract_qc_sig called before quorum was met"),
        }
    }

    /// The best QC sig this aggregator knows of: its own once quorum is
    /// met, compared against any externally received one (strong beats
    /// weak; ties favor the externally received QC, per spec.md §4.5).
    pub fn get_best_qc(&self) -> Option<QcSig> {
        let inner = self.inner.lock();
        if !inner.state.is_quorum_met() {
            return inner.received_qc_sig.clone();
        }
        drop(inner);
        let from_agg = self.extract_qc_sig();
        let inner = self.inner.lock();
        match &inner.received_qc_sig {
            None => Some(from_agg),
            Some(received) => {
                if received.is_strong() || from_agg.is_weak() {
                    Some(received.clone())
                } else {
                    Some(from_agg)
                }
            }
        }
    }

    /// Record an externally received QC sig as a candidate for
    /// `get_best_qc`, if it's better than what's already recorded (no
    /// prior value, or the prior one was weak and this one is strong).
    /// Returns whether it replaced the prior candidate.
    pub fn set_received_qc_sig(&self, qc: QcSig) -> bool {
        let mut inner = self.inner.lock();
        let better = match &inner.received_qc_sig {
            None => true,
            Some(prev) => prev.is_weak() && qc.is_strong(),
        };
        if better {
            inner.received_qc_sig = Some(qc);
        }
        better
    }

    pub fn received_qc_sig_is_strong(&self) -> bool {
        self.inner.lock().received_qc_sig.as_ref().is_some_and(QcSig::is_strong)
    }

    pub fn num_finalizers(&self) -> usize {
        self.num_finalizers
    }
}

fn next_state_after_strong_vote(state: AggregatingState, strong_sum: u64, weak_sum: u64, quorum: u64) -> AggregatingState {
    use AggregatingState::*;
    match state {
        Unrestricted | Restricted => {
            if strong_sum >= quorum {
                debug_assert!(state != Restricted, "a restricted aggregator must never reach strong quorum directly");
                Strong
            } else if strong_sum + weak_sum >= quorum {
                if state == Restricted {
                    WeakFinal
                } else {
                    WeakAchieved
                }
            } else {
                state
            }
        }
        WeakAchieved => {
            if strong_sum >= quorum {
                Strong
            } else {
                state
            }
        }
        WeakFinal | Strong => state,
    }
}

fn next_state_after_weak_vote(
    state: AggregatingState,
    strong_sum: u64,
    weak_sum: u64,
    quorum: u64,
    max_weak_sum_before_weak_final: u64,
) -> AggregatingState {
    use AggregatingState::*;
    match state {
        Unrestricted | Restricted => {
            let mut next = state;
            if strong_sum + weak_sum >= quorum {
                next = WeakAchieved;
            }
            if weak_sum > max_weak_sum_before_weak_final {
                next = if next == WeakAchieved { WeakFinal } else { Restricted };
            }
            next
        }
        WeakAchieved => {
            if weak_sum >= max_weak_sum_before_weak_final {
                WeakFinal
            } else {
                state
            }
        }
        WeakFinal | Strong => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::BlsKeyPair;

    fn sig_bytes(kp: &BlsKeyPair, msg: &[u8]) -> BlsSignatureBytes {
        kp.sign(msg).to_bytes()
    }

    /// spec.md §8 scenario 6: threshold 67, weights [34, 33, 33, 1].
    /// `max_weak_sum_before_weak_final = 101 - 2*(101-67) = 33`.
    #[test]
    fn weak_final_absorption_blocks_subsequent_strong() {
        let weights = [34u64, 33, 33, 1];
        let total: u64 = weights.iter().sum();
        let threshold = 67u64;
        let max_weak = total - (total - threshold) * 2;
        assert_eq!(max_weak, 33);

        let agg = AggregatingQcSig::new(4, threshold, max_weak);
        let keys: Vec<_> = (0..4).map(|_| BlsKeyPair::generate()).collect();
        let msg = b"weak digest";

        // weak_sum=34 already exceeds max_weak(33) before quorum: restricted.
        agg.add_vote(0, false, &sig_bytes(&keys[0], msg), weights[0]).unwrap();
        assert_eq!(agg.state(), AggregatingState::Restricted);

        // weak_sum becomes 34+33=67, meeting quorum while already over
        // max_weak: jumps straight to weak_final, the "absorption".
        agg.add_vote(1, false, &sig_bytes(&keys[1], msg), weights[1]).unwrap();
        assert_eq!(agg.state(), AggregatingState::WeakFinal);
        assert!(agg.is_quorum_met());

        agg.add_vote(2, false, &sig_bytes(&keys[2], msg), weights[2]).unwrap();
        assert_eq!(agg.state(), AggregatingState::WeakFinal);

        // A subsequent strong vote must not move state out of weak_final.
        agg.add_vote(3, true, &sig_bytes(&keys[3], msg), weights[3]).unwrap();
        assert_eq!(agg.state(), AggregatingState::WeakFinal);
        assert!(agg.is_quorum_met());
    }

    #[test]
    fn strong_quorum_reached_directly() {
        let agg = AggregatingQcSig::new(3, 2, 3);
        let keys: Vec<_> = (0..3).map(|_| BlsKeyPair::generate()).collect();
        let msg = b"strong digest";

        agg.add_vote(0, true, &sig_bytes(&keys[0], msg), 1).unwrap();
        assert_eq!(agg.state(), AggregatingState::Unrestricted);
        agg.add_vote(1, true, &sig_bytes(&keys[1], msg), 1).unwrap();
        assert_eq!(agg.state(), AggregatingState::Strong);
        assert!(agg.is_quorum_met());
    }

    #[test]
    fn duplicate_vote_is_rejected() {
        let agg = AggregatingQcSig::new(2, 2, 2);
        let keys: Vec<_> = (0..2).map(|_| BlsKeyPair::generate()).collect();
        let msg = b"msg";
        agg.add_vote(0, true, &sig_bytes(&keys[0], msg), 1).unwrap();
        let outcome = agg.add_vote(0, true, &sig_bytes(&keys[0], msg), 1).unwrap();
        assert_eq!(outcome, AddVoteOutcome::Duplicate);
    }

    #[test]
    fn has_voted_is_lock_free_readable_before_and_after() {
        let agg = AggregatingQcSig::new(2, 2, 2);
        let kp = BlsKeyPair::generate();
        assert!(!agg.has_voted(0));
        agg.add_vote(0, true, &sig_bytes(&kp, b"m"), 1).unwrap();
        assert!(agg.has_voted(0));
        assert!(!agg.has_voted(1));
    }

    #[test]
    fn get_best_qc_prefers_strong_and_ties_favor_received() {
        let agg = AggregatingQcSig::new(2, 1, 2);
        let kp = BlsKeyPair::generate();
        agg.add_vote(0, false, &sig_bytes(&kp, b"weak"), 1).unwrap();
        assert!(agg.is_quorum_met());

        let weak_from_agg = agg.get_best_qc().unwrap();
        assert!(weak_from_agg.is_weak());

        // A received strong QC should win over our own weak aggregate.
        let strong_received = QcSig {
            strong_votes: Some(VoteBitset::repeat(true, 2)),
            weak_votes: None,
            signature: kp.sign(b"strong").to_bytes(),
        };
        assert!(agg.set_received_qc_sig(strong_received.clone()));
        assert_eq!(agg.get_best_qc().unwrap(), strong_received);

        // A second, weaker received QC must not replace the strong one.
        let weaker_received = QcSig {
            strong_votes: None,
            weak_votes: Some(VoteBitset::repeat(true, 2)),
            signature: kp.sign(b"weak2").to_bytes(),
        };
        assert!(!agg.set_received_qc_sig(weaker_received));
        assert_eq!(agg.get_best_qc().unwrap(), strong_received);
    }
}
