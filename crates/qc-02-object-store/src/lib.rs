//! # qc-02-object-store — versioned, copy-on-write object store
//!
//! Component A of the Savanna finality engine (spec.md §4.1): a typed,
//! multi-index container store with a nested undo stack matching the
//! block lifecycle. A `session` is pushed per accepted block; `push`
//! keeps it; `squash` folds a short-lived nested session into its
//! parent; `undo` (the default on drop) reverts it; `commit` discards
//! undo history no longer reachable after the last-irreversible-block
//! advances.
//!
//! ## Crate layout
//!
//! - [`domain::table`] — the undo-tracked `Table<S>` and its
//!   `TableSchema` trait.
//! - [`domain::cow`] — the copy-on-write byte buffer used for shared,
//!   occasionally-mutated row fields.
//! - [`database`] — `Database`, the multi-table registry, and `Session`,
//!   the RAII undo-session handle.
//! - [`segment`] — the `shared_memory.bin` mmap'd header (magic bit,
//!   dirty bit) plus snapshot persistence.
//!
//! ## Non-goals carried over from spec.md §1
//!
//! State snapshot *wire format* is out of scope beyond what `segment`
//! needs for its own dirty-bit guard; no WASM/authorization/metering
//! concern lives in this crate.

pub mod database;
pub mod domain;
pub mod error;
pub mod segment;

pub use database::{Database, Session};
pub use domain::cow::CowBytes;
pub use domain::table::{Table, TableSchema};
pub use error::{StoreError, StoreResult};
