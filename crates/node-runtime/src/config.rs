//! `SavannaConfig`: the constants the distilled components treat as
//! given — producer round length, object-store segment sizing, the
//! `allow_dirty` recovery escape hatch, and on-disk paths.
//!
//! Reference: spec.md §6 "External interfaces"; recovered from the
//! teacher's `qc-09-finality::FinalityConfig` pattern and the original's
//! `chain_config` plumbing (see `DESIGN.md`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Mainnet-equivalent defaults for every constant the finality engine
/// needs but the distilled spec treats as externally supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SavannaConfig {
    /// Consecutive blocks a single producer is scheduled for before the
    /// round-robin schedule advances to the next producer.
    pub producer_repetitions: u32,

    /// Ceiling, in bytes, on the object store's memory-mapped segment.
    pub object_store_segment_bytes: u64,

    /// If true, a node that crashed mid-write may resume from a segment
    /// whose dirty bit was left set, trusting the last fsync'd state
    /// instead of refusing to start. Mainnet default is `false`.
    pub allow_dirty: bool,

    /// Directory the object store's `shared_memory.bin` lives in.
    pub data_dir: PathBuf,

    /// Path to this node's finalizer safety-info file.
    pub fsi_path: PathBuf,
}

impl Default for SavannaConfig {
    fn default() -> Self {
        SavannaConfig {
            producer_repetitions: 12,
            object_store_segment_bytes: 1 << 30,
            allow_dirty: false,
            data_dir: PathBuf::from("./data"),
            fsi_path: PathBuf::from("./data/safety.dat"),
        }
    }
}

impl SavannaConfig {
    /// Load from a TOML file, falling back to field defaults for
    /// anything the file omits.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }
}
