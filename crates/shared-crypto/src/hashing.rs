//! # SHA-256 Digest Helpers
//!
//! The finality digest, base digest, and weak-vote digest are all plain
//! SHA-256 over an explicit byte layout (see `qc-08-block-header-state`).
//! This module provides the one-shot and streaming primitives the rest of
//! the engine builds its digest packing on top of.

use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

/// Hash a single buffer.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of several buffers without an intermediate copy.
pub fn sha256_many(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Append a domain-separation suffix to a digest and hash again. Used for
/// the weak-vote digest: `SHA256(finality_digest || "WEAK")`.
pub fn sha256_with_suffix(digest: &Hash, suffix: &[u8]) -> Hash {
    sha256_many(&[digest, suffix])
}

/// A binary Merkle root over `leaves`, in order. An empty slice hashes to
/// the all-zero digest; an odd level duplicates its last node, matching
/// the reversible-blocks-mroot and proposer-schedule commitments.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let digest = if pair.len() == 2 {
                sha256_many(&[&pair[0], &pair[1]])
            } else {
                sha256_many(&[&pair[0], &pair[0]])
            };
            next.push(digest);
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(sha256(b"abc"), sha256(b"abc"));
    }

    #[test]
    fn many_matches_concat() {
        let a = sha256_many(&[b"foo", b"bar"]);
        let b = sha256(b"foobar");
        assert_eq!(a, b);
    }

    #[test]
    fn suffix_changes_digest() {
        let base = sha256(b"finality");
        let weak = sha256_with_suffix(&base, b"WEAK");
        assert_ne!(base, weak);
    }

    #[test]
    fn merkle_root_empty_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn merkle_root_single_leaf_is_itself() {
        let leaf = sha256(b"only");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_odd_count_duplicates_last() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        let c = sha256(b"c");
        let root = merkle_root(&[a, b, c]);
        let expected = sha256_many(&[
            &sha256_many(&[&a, &b])[..],
            &sha256_many(&[&c, &c])[..],
        ]);
        assert_eq!(root, expected);
    }
}
