//! Outbound ports: collaborators this crate calls out to.

use shared_types::{BlockNum, FinalizerPolicyPtr};

/// Looks up the finalizer policy that was active at a given past block
/// number, resolved via the block reference held in the finality core.
///
/// Modeled as a caller-supplied port (DESIGN.md open question #3)
/// because the fork database — which owns the arena of block header
/// states — lives outside this crate (spec.md §9 "fork database
/// back-edges").
pub trait BlockAtHeight: Send + Sync {
    fn finalizer_policy_at(&self, block_num: BlockNum) -> Option<FinalizerPolicyPtr>;
}

/// A port that never finds a historical policy. Useful for genesis-only
/// derivation and in tests where no fork-spanning lookups occur.
pub struct NoHistoricalPolicies;

impl BlockAtHeight for NoHistoricalPolicies {
    fn finalizer_policy_at(&self, _block_num: BlockNum) -> Option<FinalizerPolicyPtr> {
        None
    }
}
