//! Driving port: the API the node runtime calls into per accepted or
//! proposed block.
//!
//! Reference: spec.md §4.2, §4.2.4.

use async_trait::async_trait;

use crate::domain::{BlockHeaderState, HeaderInput};
use crate::error::CoreResult;

/// Block header state derivation and validation.
#[async_trait]
pub trait BlockHeaderStateApi: Send + Sync {
    /// Derive the child state for a block this node is producing.
    async fn derive_next(
        &self,
        parent_block_id: shared_types::Hash,
        input: HeaderInput,
    ) -> CoreResult<BlockHeaderState>;

    /// Validate and derive the state for an incoming, network-received
    /// header whose claimed parent is `parent_block_id`.
    async fn validate_incoming(
        &self,
        parent_block_id: shared_types::Hash,
        header: crate::domain::BlockHeader,
    ) -> CoreResult<BlockHeaderState>;

    /// Fetch a previously derived state by block id, if this service
    /// still retains it.
    async fn get_state(&self, block_id: shared_types::Hash) -> Option<BlockHeaderState>;
}
