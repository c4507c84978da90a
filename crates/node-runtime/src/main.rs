//! # Savanna Finality Node
//!
//! Entry point for the node runtime. Loads configuration, opens the
//! object store, seeds the genesis block header state, and wires the
//! four Savanna components into one [`node_runtime::SavannaController`].
//!
//! Block production, vote broadcast, and peer discovery are external
//! collaborators (spec.md §1 Non-goals); this binary owns only the
//! above wiring plus the shutdown signal wait.

use std::sync::Arc;

use anyhow::Result;
use qc_02_object_store::Database;
use qc_08_block_header_state::{BlockHeaderState, BlockHeaderStateService, NoHistoricalPolicies};
use qc_09_finality::{FinalizerSet, FinalizerVoteService};
use shared_types::{FinalizerPolicy, ProducerAuthority, ProposerPolicy, ProposerSchedule};
use tracing::info;

fn genesis_state(producer_name: &str) -> BlockHeaderState {
    let producer = ProducerAuthority { name: producer_name.to_string(), authority: [0u8; 48] };
    let proposer_policy = Arc::new(ProposerPolicy {
        proposal_time: 0,
        proposer_schedule: ProposerSchedule { version: 1, producers: vec![producer.clone()] },
    });
    let finalizer_policy = Arc::new(FinalizerPolicy { generation: 1, threshold: 1, finalizers: vec![] });
    BlockHeaderState::genesis(1, 0, producer, proposer_policy, finalizer_policy)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    info!("savanna node starting");

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = match config_path {
        Some(path) => node_runtime::SavannaConfig::load(&path)?,
        None => node_runtime::SavannaConfig::default(),
    };
    info!(producer_repetitions = config.producer_repetitions, allow_dirty = config.allow_dirty, "configuration loaded");

    let store = Database::open(&config.data_dir, config.object_store_segment_bytes, config.allow_dirty)?;
    let genesis = genesis_state("genesis-producer");
    let headers = BlockHeaderStateService::new(Arc::new(NoHistoricalPolicies), genesis);
    let finalizer_set = FinalizerSet::open(config.fsi_path.clone(), &[])?;
    let finalizers = FinalizerVoteService::new(finalizer_set);

    let controller = node_runtime::SavannaController::new(config, store, headers, finalizers);
    info!("four components wired; controller ready");

    info!("node is running. press ctrl+c to stop.");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    controller.store.close()?;
    Ok(())
}
