//! Errors for quorum-certificate aggregation and verification.
//!
//! Reference: spec.md §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QcError {
    #[error("finalizer {0} has already voted on this policy")]
    Duplicate(usize),

    #[error("qc failed shape, weight, or dual-finalizer validation: {0}")]
    InvalidQc(String),

    #[error("qc signature failed verification")]
    InvalidQcSignature,

    #[error("unknown finalizer public key")]
    UnknownPublicKey,

    #[error(transparent)]
    Crypto(#[from] shared_crypto::CryptoError),
}

pub type QcResult<T> = Result<T, QcError>;

impl From<QcError> for shared_types::CoreErrorKind {
    fn from(err: QcError) -> Self {
        match err {
            QcError::InvalidQcSignature => shared_types::CoreErrorKind::InvalidQcSignature,
            _ => shared_types::CoreErrorKind::InvalidQc,
        }
    }
}
