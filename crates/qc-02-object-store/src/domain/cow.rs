//! Copy-on-write byte buffer.
//!
//! Reference: spec.md §4.1 "Copy-on-write string/vector": `{ refcount,
//! size, payload }`, assignment is a refcount bump, mutation copies,
//! equality/ordering compare the payload only, and the buffer frees
//! through the segment allocator once its refcount hits zero.
//!
//! `DESIGN.md` narrows this to `Arc<[u8]>`: `Arc`'s strong count *is* the
//! refcount, `Arc::clone` *is* the refcount-bump assignment, and
//! `Arc::make_mut` performs the copy-on-write clone exactly when the count
//! is greater than one. No hand-rolled refcount header is needed because
//! Rust's allocator (not a shared segment) backs the bytes; see the open
//! question resolution in `DESIGN.md`.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A reference-counted, copy-on-write byte buffer used for row fields that
/// are frequently shared unmodified between rows (e.g. serialized policy
/// blobs) and occasionally mutated in place.
#[derive(Debug, Clone, Default)]
pub struct CowBytes(Arc<[u8]>);

impl CowBytes {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        CowBytes(bytes.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        CowBytes(Arc::from(bytes))
    }

    /// Number of live references sharing this payload, i.e. the refcount
    /// the spec's layout would store inline.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Mutate the payload in place, copying first iff another owner is
    /// sharing it (`Arc::make_mut`'s clone-on-write semantics).
    pub fn with_mut(&mut self, f: impl FnOnce(&mut Vec<u8>)) {
        let current = std::mem::replace(&mut self.0, Arc::from(Vec::new()));
        let mut owned: Vec<u8> = match Arc::try_unwrap(current) {
            Ok(boxed) => boxed.into_vec(),
            Err(shared) => shared.to_vec(),
        };
        f(&mut owned);
        self.0 = Arc::from(owned);
    }
}

impl Deref for CowBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for CowBytes {
    fn eq(&self, other: &Self) -> bool {
        // Payload equality, not pointer equality, per the spec's
        // contract ("equality/compare operate on payload").
        self.0.as_ref() == other.0.as_ref()
    }
}
impl Eq for CowBytes {}

impl PartialOrd for CowBytes {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for CowBytes {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl From<Vec<u8>> for CowBytes {
    fn from(v: Vec<u8>) -> Self {
        CowBytes(Arc::from(v))
    }
}

impl Serialize for CowBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for CowBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Ok(CowBytes(Arc::from(bytes)))
    }
}
