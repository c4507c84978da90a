//! Error taxonomy for block header state derivation.
//!
//! Reference: shared_types::CoreErrorKind (spec-level categories) plus
//! the local detail `thiserror` attaches for the specific step that
//! rejected.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unlinkable block: {0}")]
    UnlinkableBlock(String),
    #[error("wrong producer: {0}")]
    WrongProducer(String),
    #[error("invalid block header extension: {0}")]
    InvalidExtension(String),
    #[error("invalid qc claim: {0}")]
    InvalidQcClaim(String),
    #[error("block validate exception: {0}")]
    BlockValidate(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<CoreError> for shared_types::CoreErrorKind {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnlinkableBlock(_) => shared_types::CoreErrorKind::UnlinkableBlock,
            CoreError::WrongProducer(_) => shared_types::CoreErrorKind::WrongProducer,
            CoreError::InvalidExtension(_) => {
                shared_types::CoreErrorKind::InvalidBlockHeaderExtension
            }
            CoreError::InvalidQcClaim(_) => shared_types::CoreErrorKind::InvalidQcClaim,
            CoreError::BlockValidate(msg) => shared_types::CoreErrorKind::BlockValidateException(msg),
            CoreError::NotFound(_) => shared_types::CoreErrorKind::NotFound,
        }
    }
}
