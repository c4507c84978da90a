//! Error types for the object store.
//!
//! Reference: spec.md §4.1 "Failure semantics", §7 error taxonomy.

use thiserror::Error;

/// Failure modes raised by table operations, sessions, and the segment.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` or `modify` would collide with an existing secondary-index
    /// entry. The mutation is rolled back before this is raised.
    #[error("duplicate key for row id {0}")]
    DuplicateKey(u64),

    /// `get`/`find` found no row for the given key.
    #[error("row not found")]
    NotFound,

    /// The segment has no room left for the requested allocation.
    #[error("object store out of capacity")]
    OutOfMemory,

    /// A guard condition tripped (e.g. on-disk dirty bit set on reopen, or
    /// a revision comparison under/overflowed); the enclosing session is
    /// aborted.
    #[error("database guard: {0}")]
    DatabaseGuard(String),

    /// `set_revision` was given a value that cannot be a valid revision.
    #[error("invalid revision: {0}")]
    InvalidRevision(i64),

    /// The requested undo session nesting does not exist (e.g. `squash`
    /// called on the root session).
    #[error("no parent session to squash into")]
    NoParentSession,

    /// Persistence I/O failure (mmap open/flush, file truncate, etc).
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized segment bytes failed to decode.
    #[error("segment decode error: {0}")]
    Decode(String),
}

/// Result alias used throughout the object store.
pub type StoreResult<T> = Result<T, StoreError>;
