//! The multi-index container registry: `Database` owns one `Table<S>` per
//! registered schema and coordinates nested undo sessions across all of
//! them in lockstep.
//!
//! Reference: spec.md §4.1.

use std::any::TypeId;
use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use crate::domain::table::{Table, TableDyn, TableSchema};
use crate::error::{StoreError, StoreResult};
use crate::segment::SegmentFile;

struct Inner {
    tables: HashMap<TypeId, Box<dyn TableDyn>>,
    table_names: HashMap<TypeId, &'static str>,
    /// Current session-stack depth, shared across every registered table.
    revision: i64,
    /// Per-table footprint ceiling, propagated to every table registered
    /// from this point on (spec §4.1's out-of-space failure mode).
    capacity_bytes: Option<u64>,
    /// The backing `shared_memory.bin` segment, present only when opened
    /// via [`Database::open`] rather than [`Database::new`].
    segment: Option<SegmentFile>,
    /// Table snapshots read back from the segment on open, keyed by
    /// `TableSchema::NAME`, drained as each table registers.
    pending_snapshot: HashMap<String, Vec<u8>>,
}

/// A versioned, multi-table object store with nested undo sessions.
///
/// Every table registered via [`Database::register`] is kept at the same
/// session depth: starting, squashing, or undoing a session touches every
/// table in lockstep, matching the "aligning stores in multi-index
/// databases" contract in spec §4.1.
pub struct Database {
    inner: Mutex<Inner>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Database {
            inner: Mutex::new(Inner {
                tables: HashMap::new(),
                table_names: HashMap::new(),
                revision: 0,
                capacity_bytes: None,
                segment: None,
                pending_snapshot: HashMap::new(),
            }),
        }
    }

    /// Like [`Database::new`], but every table registered from here on is
    /// bounded to `capacity_bytes` (spec §4.1's out-of-space failure
    /// mode), with no backing segment file.
    pub fn new_with_capacity(capacity_bytes: u64) -> Self {
        Database {
            inner: Mutex::new(Inner {
                tables: HashMap::new(),
                table_names: HashMap::new(),
                revision: 0,
                capacity_bytes: Some(capacity_bytes),
                segment: None,
                pending_snapshot: HashMap::new(),
            }),
        }
    }

    /// Open (creating if absent) the `shared_memory.bin` segment under
    /// `data_dir`, loading back whatever snapshot a prior clean shutdown
    /// left behind. `capacity_bytes` bounds both the segment's on-disk
    /// size and each registered table's in-memory footprint. Matches
    /// spec §6's mmap-backed, dirty-bit-guarded persistence.
    pub fn open(data_dir: impl AsRef<Path>, capacity_bytes: u64, allow_dirty: bool) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let mut segment = SegmentFile::open(data_dir.join("shared_memory.bin"), capacity_bytes, allow_dirty)?;
        let payload = segment.read_snapshot()?;
        let pending_snapshot: HashMap<String, Vec<u8>> = if payload.is_empty() {
            HashMap::new()
        } else {
            bincode::deserialize(&payload).map_err(|e| StoreError::Decode(e.to_string()))?
        };

        Ok(Database {
            inner: Mutex::new(Inner {
                tables: HashMap::new(),
                table_names: HashMap::new(),
                revision: 0,
                capacity_bytes: Some(capacity_bytes),
                segment: Some(segment),
                pending_snapshot,
            }),
        })
    }

    /// Register a table type. Safe to call more than once (a no-op after
    /// the first call). If sessions are already open, the new table is
    /// fast-forwarded with empty frames so every table's stack depth
    /// stays aligned — mirroring the original's `add_index` revision-
    /// repair loop for indices registered after startup. If this
    /// `Database` was opened with [`Database::open`] and a snapshot for
    /// `S::NAME` was found, the table is restored from it.
    pub fn register<S: TableSchema>(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let type_id = TypeId::of::<S>();
        if inner.tables.contains_key(&type_id) {
            return Ok(());
        }
        let mut table: Table<S> = match inner.capacity_bytes {
            Some(capacity) => Table::with_capacity(capacity),
            None => Table::default(),
        };
        if let Some(bytes) = inner.pending_snapshot.remove(S::NAME) {
            table.restore(&bytes)?;
        }
        let current_revision = inner.revision;
        for rev in 1..=current_revision {
            table.push_session_at(rev);
        }
        inner.tables.insert(type_id, Box::new(table));
        inner.table_names.insert(type_id, S::NAME);
        Ok(())
    }

    /// Serialize every registered table and write it as one snapshot
    /// blob to the backing segment. A no-op if this `Database` was not
    /// opened with a segment (i.e. constructed via `new`/`new_with_capacity`).
    pub fn persist(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.segment.is_none() {
            return Ok(());
        }
        let mut blobs: HashMap<String, Vec<u8>> = HashMap::new();
        for (type_id, table) in &inner.tables {
            let name = inner.table_names[type_id];
            blobs.insert(name.to_string(), table.snapshot());
        }
        let payload = bincode::serialize(&blobs).expect("snapshot map encoding cannot fail");
        inner.segment.as_mut().unwrap().write_snapshot(&payload)
    }

    /// Persist and mark the backing segment cleanly closed. Call once at
    /// node shutdown; a no-op if there is no backing segment.
    pub fn close(&self) -> StoreResult<()> {
        self.persist()?;
        let mut inner = self.inner.lock();
        match inner.segment.as_mut() {
            Some(segment) => segment.mark_clean(),
            None => Ok(()),
        }
    }

    fn with_table<S: TableSchema, R>(&self, f: impl FnOnce(&Table<S>) -> R) -> R {
        let inner = self.inner.lock();
        let boxed = inner
            .tables
            .get(&TypeId::of::<S>())
            .expect("table not registered; call Database::register first");
        let table = boxed
            .as_any()
            .downcast_ref::<Table<S>>()
            .expect("TypeId collision");
        f(table)
    }

    fn with_table_mut<S: TableSchema, R>(&self, f: impl FnOnce(&mut Table<S>) -> R) -> R {
        let mut inner = self.inner.lock();
        let boxed = inner
            .tables
            .get_mut(&TypeId::of::<S>())
            .expect("table not registered; call Database::register first");
        let table = boxed
            .as_any_mut()
            .downcast_mut::<Table<S>>()
            .expect("TypeId collision");
        f(table)
    }

    pub fn create<S: TableSchema>(
        &self,
        ctor: impl FnOnce(&mut S::Row),
    ) -> StoreResult<S::Row> {
        self.with_table_mut::<S, _>(|t| t.create(ctor)).map_err(|e| {
            tracing::debug!(error = %e, "object store create rejected");
            e
        })
    }

    pub fn modify<S: TableSchema>(
        &self,
        id: u64,
        mutator: impl FnOnce(&mut S::Row),
    ) -> StoreResult<S::Row> {
        self.with_table_mut::<S, _>(|t| t.modify(id, mutator))
            .map_err(|e| {
                tracing::debug!(id, error = %e, "object store modify rejected");
                e
            })
    }

    pub fn remove<S: TableSchema>(&self, id: u64) -> StoreResult<()> {
        self.with_table_mut::<S, _>(|t| t.remove(id)).map_err(|e| {
            tracing::debug!(id, error = %e, "object store remove rejected");
            e
        })
    }

    pub fn find<S: TableSchema>(&self, id: u64) -> Option<S::Row> {
        self.with_table::<S, _>(|t| t.find(id).cloned())
    }

    pub fn get<S: TableSchema>(&self, id: u64) -> StoreResult<S::Row> {
        self.find::<S>(id).ok_or(StoreError::NotFound)
    }

    pub fn find_by_key<S: TableSchema>(&self, key: &S::SecondaryKey) -> Option<S::Row> {
        self.with_table::<S, _>(|t| t.find_by_key(key).cloned())
    }

    pub fn get_by_key<S: TableSchema>(&self, key: &S::SecondaryKey) -> StoreResult<S::Row> {
        self.find_by_key::<S>(key).ok_or(StoreError::NotFound)
    }

    pub fn all<S: TableSchema>(&self) -> Vec<S::Row> {
        self.with_table::<S, _>(|t| t.iter().cloned().collect())
    }

    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// Force the revision counter to `n` without touching any table's
    /// frame stack. Used to align a freshly loaded store with the
    /// fork database's notion of the current block number. Per the open
    /// question in spec §9, `i64` is used throughout and negative values
    /// are rejected rather than silently wrapping.
    pub fn set_revision(&self, n: i64) -> StoreResult<()> {
        if n < 0 {
            return Err(StoreError::InvalidRevision(n));
        }
        self.inner.lock().revision = n;
        Ok(())
    }

    /// Open a new nested session. Every registered table receives a new,
    /// empty undo frame tagged with the new revision number.
    pub fn start_undo_session(&self, enabled: bool) -> Session<'_> {
        let mut inner = self.inner.lock();
        inner.revision += 1;
        let revision = inner.revision;
        if enabled {
            for table in inner.tables.values_mut() {
                table.push_session_at(revision);
            }
        }
        Session {
            db: self,
            revision,
            enabled,
            finished: false,
        }
    }

    fn undo_internal(&self, revision: i64) {
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.revision, revision,
            "sessions must be dropped/undone in LIFO order"
        );
        for table in inner.tables.values_mut() {
            table.undo_top();
        }
        inner.revision -= 1;
    }

    fn squash_internal(&self, revision: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.revision, revision,
            "sessions must be squashed in LIFO order"
        );
        for table in inner.tables.values_mut() {
            table.squash_top()?;
        }
        inner.revision -= 1;
        Ok(())
    }

    /// Revert every open session down to an empty undo stack.
    pub fn undo_all(&self) {
        loop {
            let revision = self.inner.lock().revision;
            if revision == 0 {
                break;
            }
            self.undo_internal(revision);
        }
    }

    /// Discard undo records at or below `revision`, making the
    /// corresponding mutations permanent. Mirrors the fork database
    /// committing a new last-irreversible-block.
    pub fn commit(&self, revision: i64) {
        let mut inner = self.inner.lock();
        for table in inner.tables.values_mut() {
            table.commit_below(revision);
        }
    }
}

/// A nested, reversible unit of mutation. Dropping the session without
/// calling [`Session::push`], [`Session::squash`], or [`Session::undo`]
/// undoes it — matching "undo (default on drop)" in spec §4.1.
pub struct Session<'a> {
    db: &'a Database,
    revision: i64,
    enabled: bool,
    finished: bool,
}

impl<'a> Session<'a> {
    /// The revision this session represents.
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Retain this session's effects past its scope: the frame stays on
    /// every table's undo stack (available to a later `undo` or
    /// `commit`), but is not reverted when this handle drops. Exactly one
    /// session is pushed per accepted block (spec §4.6).
    pub fn push(mut self) {
        self.finished = true;
    }

    /// Fold this session's frame into its parent's, as if the two had
    /// been one session. Fails with `NoParentSession` if this is the
    /// outermost session.
    pub fn squash(mut self) -> StoreResult<()> {
        let result = if self.enabled {
            self.db.squash_internal(self.revision)
        } else {
            Ok(())
        };
        self.finished = true;
        result
    }

    /// Revert every mutation made since this session was opened.
    pub fn undo(mut self) {
        if self.enabled {
            self.db.undo_internal(self.revision);
        }
        self.finished = true;
    }
}

impl<'a> Drop for Session<'a> {
    fn drop(&mut self) {
        if !self.finished && self.enabled {
            self.db.undo_internal(self.revision);
        }
    }
}
