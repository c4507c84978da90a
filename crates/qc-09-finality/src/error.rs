//! Errors for the finalizer vote-decision and safety-info subsystem.
//!
//! Reference: spec.md §7, §4.4.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinalityError {
    #[error("finalizer safety info load/save failed: {0}")]
    Safety(String),

    #[error("finalizer safety persistence file has a bad magic number")]
    BadMagic,

    #[error("finalizer safety persistence file version {found} is newer than the {supported} this build understands")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("finalizer safety persistence file failed its checksum")]
    BadChecksum,

    #[error("finalizer safety persistence file is truncated or malformed: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FinalityResult<T> = Result<T, FinalityError>;

impl From<FinalityError> for shared_types::CoreErrorKind {
    fn from(err: FinalityError) -> Self {
        shared_types::CoreErrorKind::FinalizerSafetyException(err.to_string())
    }
}
