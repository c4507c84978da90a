//! # Shared Error Primitives
//!
//! The error kinds named across the engine (see SPEC_FULL §7). Each owning
//! crate defines its own `thiserror` enum; this module holds the kinds that
//! are genuinely shared (raised by more than one crate) so callers can
//! match on them without depending on every crate's concrete error type.

use thiserror::Error;

/// Error kinds shared across header validation, the finality core, and QC
/// verification. Owning crates wrap this with `#[from]` rather than
/// re-stringifying it.
#[derive(Debug, Clone, Error)]
pub enum CoreErrorKind {
    #[error("block does not link to its claimed parent")]
    UnlinkableBlock,

    #[error("block producer does not match the expected schedule")]
    WrongProducer,

    #[error("block header is missing the required finality extension")]
    InvalidBlockHeaderExtension,

    #[error("qc claim is not monotonic or exceeds the parent's block number")]
    InvalidQcClaim,

    #[error("qc signature failed verification")]
    InvalidQcSignature,

    #[error("qc failed shape, weight, or dual-finalizer validation")]
    InvalidQc,

    #[error("finalizer safety info load/save failed: {0}")]
    FinalizerSafetyException(String),

    #[error("block header failed validation: {0}")]
    BlockValidateException(String),

    #[error("object store guard tripped: {0}")]
    DatabaseGuard(String),

    #[error("object store is out of capacity")]
    OutOfMemory,

    #[error("row not found")]
    NotFound,
}

/// Node operational state, surfaced by the orchestrator for logging and
/// health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Running,
    Syncing,
    HaltedAwaitingIntervention,
}
