//! # Shared Crypto
//!
//! The two cryptographic primitives the engine treats as oracles:
//!
//! | Module | Algorithm | Use case |
//! |--------|-----------|----------|
//! | `bls`     | BLS12-381 | finalizer vote signing, QC aggregation |
//! | `hashing` | SHA-256   | base digest, finality digest, weak-vote digest |
//!
//! Neither primitive's internals are re-derived here; both wrap `blst` and
//! `sha2` respectively and expose only the operations the rest of the
//! engine needs.

#![warn(missing_docs)]

pub mod bls;
pub mod errors;
pub mod hashing;

pub use bls::{BlsKeyPair, BlsPublicKey, BlsSecretKey, BlsSignature};
pub use errors::CryptoError;
pub use hashing::{merkle_root, sha256, sha256_many, sha256_with_suffix};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
