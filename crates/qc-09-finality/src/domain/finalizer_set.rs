//! The `my_finalizers` aggregate: runs [`decide_vote`] for every locally
//! configured finalizer against one block and batches the resulting FSI
//! writes into a single file rewrite.
//!
//! Reference: spec.md §4.4 "Multi-finalizer aggregate (`my_finalizers`)";
//! grounded on `original_source/libraries/chain/finalizer.cpp`'s
//! `my_finalizers_t::maybe_vote`.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use shared_types::{BlockRef, BlsPublicKeyBytes, FinalizerSafetyInfo, VoteStrength};

use crate::domain::decision::{decide_vote, maybe_update_fsi, VoteInput};
use crate::domain::fsi_store::FsiStore;
use crate::error::{FinalityError, FinalityResult};

/// One vote this finalizer set decided to cast for a single configured
/// key. The caller signs `block_ref.finality_digest` (strong) or
/// `SHA256(finality_digest || "WEAK")` (weak) and broadcasts — only after
/// this batch's FSI write has landed on disk (§5 durability rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastVote {
    pub finalizer_public_key: BlsPublicKeyBytes,
    pub strength: VoteStrength,
    pub block_ref: BlockRef,
}

/// An externally-observed QC, fed to [`FinalizerSet::observe_qc`] so a
/// finalizer whose own vote never got persisted (crash before save) can
/// fast-forward its FSI once the QC it must have voted in proves it.
pub struct QcObservation {
    pub finalizer_public_key: BlsPublicKeyBytes,
    pub qc_block_ref: BlockRef,
    pub voted_block_ref: BlockRef,
    /// Recovered from `finalizer.cpp`'s `has_voted_strong` cross-check:
    /// true iff this finalizer's bit is set in the QC's **strong**
    /// bitset (active or pending policy) — a weak bit must never
    /// fast-forward FSI.
    pub voted_strong: bool,
}

/// Owns every locally configured finalizer's [`FinalizerSafetyInfo`] plus
/// the on-disk store backing it. A single mutex serializes all mutation,
/// matching spec.md §5 ("FSI mutation is serialized by a mutex").
pub struct FinalizerSet {
    store: FsiStore,
    safety: Mutex<HashMap<BlsPublicKeyBytes, FinalizerSafetyInfo>>,
}

impl FinalizerSet {
    /// Load (or initialize) the safety file at `path` for exactly the
    /// given set of locally configured finalizer keys.
    pub fn open(path: impl Into<PathBuf>, configured_keys: &[BlsPublicKeyBytes]) -> FinalityResult<Self> {
        let (store, safety) = FsiStore::open(path, configured_keys)?;
        Ok(FinalizerSet {
            store,
            safety: Mutex::new(safety),
        })
    }

    /// Current safety info for a configured key, if any.
    pub fn safety_info(&self, key: &BlsPublicKeyBytes) -> Option<FinalizerSafetyInfo> {
        self.safety.lock().get(key).copied()
    }

    /// Seed a newly-configured finalizer's FSI, but only if it is
    /// currently empty — the original never overwrites an existing
    /// record (spec.md §4.4 `set_default_safety_information`).
    pub fn set_default_safety_information(&self, key: BlsPublicKeyBytes, default: FinalizerSafetyInfo) -> FinalityResult<()> {
        let mut g = self.safety.lock();
        let entry = g.entry(key).or_insert_with(FinalizerSafetyInfo::empty);
        if entry.is_empty() {
            *entry = default;
            self.store.save(&g)?;
        }
        Ok(())
    }

    /// Run [`decide_vote`] for every configured finalizer against one
    /// block. `inputs` must carry one [`VoteInput`] per configured key
    /// (the caller computes `extends_lock`/`extends_last_vote` against
    /// that key's *current* fsi via the finality core's `extends()`,
    /// which lives in the sibling `qc-08-block-header-state` crate this
    /// one deliberately does not depend on — see `decision.rs`'s module
    /// doc). Keys with no entry in `inputs` are skipped, not defaulted.
    ///
    /// All resulting FSI mutations are flushed in a single file rewrite,
    /// and that write completes before this call returns — no vote in
    /// the returned batch may be broadcast before it.
    pub fn decide_for_block(
        &self,
        inputs: &HashMap<BlsPublicKeyBytes, VoteInput>,
    ) -> FinalityResult<Vec<CastVote>> {
        let mut g = self.safety.lock();
        let mut votes = Vec::new();
        let mut changed = false;

        for (key, input) in inputs {
            let Some(fsi) = g.get_mut(key) else { continue };
            let before = *fsi;
            let result = decide_vote(fsi, input);
            if *fsi != before {
                changed = true;
            }
            if let Some(strength) = result.decision {
                votes.push(CastVote {
                    finalizer_public_key: *key,
                    strength,
                    block_ref: fsi.last_vote,
                });
            }
        }

        if changed {
            self.store.save(&g)?;
        }
        Ok(votes)
    }

    /// Recovery path for a single finalizer (spec.md §4.4 "also-update
    /// path"). No-op (and no disk write) unless `observation.voted_strong`
    /// holds and both the lock and last-vote timestamps strictly advance.
    pub fn observe_qc(&self, observation: QcObservation) -> FinalityResult<bool> {
        if !observation.voted_strong {
            return Ok(false);
        }
        let mut g = self.safety.lock();
        let fsi = g
            .get_mut(&observation.finalizer_public_key)
            .ok_or_else(|| FinalityError::Safety("observe_qc for an unconfigured finalizer key".into()))?;
        let updated = maybe_update_fsi(fsi, observation.qc_block_ref, observation.voted_block_ref);
        if updated {
            self.store.save(&g)?;
        }
        Ok(updated)
    }
}
