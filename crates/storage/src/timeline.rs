//! Timeline store: per-document change logs
//!
//! A timeline maps `ChangeId -> Change` for one `(table, key)`. Storage order
//! is irrelevant; every read returns a detached copy ordered by `ChangeId`.
//!
//! # Backends
//!
//! `TimelineStore` is the seam to the physical storage engine. Backends are
//! responsible for per-entry atomicity of writes and deletes; callers hold no
//! locks. A backend that observes a concurrent writer while copying a
//! timeline may fail the read with `SorError::ConcurrentModification`, which
//! the read paths in this crate retry.
//!
//! `InMemoryTimelineStore` keeps everything in a `BTreeMap` per table behind
//! a `parking_lot::RwLock`. Readers never wait for the lock: if a writer
//! holds it, the read reports a concurrent modification instead of blocking.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use sor_core::{Change, ChangeId, SorError, SorResult};

/// Detached, ordered copy of one document's timeline
pub type Timeline = BTreeMap<ChangeId, Change>;

/// Storage backend holding every document's timeline
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads.
pub trait TimelineStore: Send + Sync {
    /// Copy of the timeline for `(table, key)`; empty if it does not exist
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` if a writer raced the copy; any other
    /// backend failure as `Storage`.
    fn get(&self, table: &str, key: &str) -> SorResult<Timeline>;

    /// Write one entry, replacing any entry with the same id
    fn put(&self, table: &str, key: &str, change: Change) -> SorResult<()>;

    /// Remove one entry; removing a missing entry is a no-op
    fn delete(&self, table: &str, key: &str, change_id: ChangeId) -> SorResult<()>;

    /// Write `put` (if any), then remove `deletes`, on one document
    ///
    /// Backends that can should apply the batch atomically. The default
    /// issues the put first so a concurrent reader never observes the
    /// deletions without the replacement entry.
    fn apply_batch(
        &self,
        table: &str,
        key: &str,
        put: Option<Change>,
        deletes: &[ChangeId],
    ) -> SorResult<()> {
        if let Some(change) = put {
            self.put(table, key, change)?;
        }
        for id in deletes {
            self.delete(table, key, *id)?;
        }
        Ok(())
    }

    /// Row keys of `table` in ascending order
    ///
    /// Returns at most `limit` keys strictly greater than `from_exclusive`
    /// (or from the start) and at most `to_inclusive` (or unbounded).
    fn scan_keys(
        &self,
        table: &str,
        from_exclusive: Option<&str>,
        to_inclusive: Option<&str>,
        limit: usize,
    ) -> SorResult<Vec<String>>;

    /// Number of documents in `table`
    fn count_keys(&self, table: &str) -> SorResult<u64>;

    /// Drop every document in `table`
    fn purge_table(&self, table: &str) -> SorResult<()>;
}

type TableData = BTreeMap<String, FxHashMap<ChangeId, Change>>;

/// In-process timeline store for tests and single-node use
///
/// A document exists while its timeline is non-empty: deleting its last
/// entry removes the row key from scans.
#[derive(Debug, Default)]
pub struct InMemoryTimelineStore {
    tables: RwLock<FxHashMap<String, TableData>>,
}

impl InMemoryTimelineStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables holding at least one document
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

impl TimelineStore for InMemoryTimelineStore {
    fn get(&self, table: &str, key: &str) -> SorResult<Timeline> {
        let tables = self
            .tables
            .try_read()
            .ok_or_else(|| SorError::concurrent_modification(table, key))?;
        let timeline = tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|changes| {
                changes
                    .iter()
                    .map(|(id, change)| (*id, change.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(timeline)
    }

    fn put(&self, table: &str, key: &str, change: Change) -> SorResult<()> {
        let mut tables = self.tables.write();
        trace!(target: "sor::timeline", table, key, change_id = %change.id(), "put");
        tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(change.id(), change);
        Ok(())
    }

    fn delete(&self, table: &str, key: &str, change_id: ChangeId) -> SorResult<()> {
        self.apply_batch(table, key, None, &[change_id])
    }

    fn apply_batch(
        &self,
        table: &str,
        key: &str,
        put: Option<Change>,
        deletes: &[ChangeId],
    ) -> SorResult<()> {
        let mut tables = self.tables.write();
        if let Some(change) = put {
            trace!(target: "sor::timeline", table, key, change_id = %change.id(), "put");
            tables
                .entry(table.to_string())
                .or_default()
                .entry(key.to_string())
                .or_default()
                .insert(change.id(), change);
        }
        if deletes.is_empty() {
            return Ok(());
        }
        let Some(rows) = tables.get_mut(table) else {
            return Ok(());
        };
        let now_empty = match rows.get_mut(key) {
            Some(changes) => {
                for id in deletes {
                    changes.remove(id);
                }
                changes.is_empty()
            }
            None => false,
        };
        if now_empty {
            rows.remove(key);
            if rows.is_empty() {
                tables.remove(table);
            }
        }
        trace!(target: "sor::timeline", table, key, deleted = deletes.len(), "delete");
        Ok(())
    }

    fn scan_keys(
        &self,
        table: &str,
        from_exclusive: Option<&str>,
        to_inclusive: Option<&str>,
        limit: usize,
    ) -> SorResult<Vec<String>> {
        let tables = self
            .tables
            .try_read()
            .ok_or_else(|| SorError::concurrent_modification(table, from_exclusive.unwrap_or("")))?;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let lower = match from_exclusive {
            Some(from) => Bound::Excluded(from),
            None => Bound::Unbounded,
        };
        let upper = match to_inclusive {
            Some(to) => Bound::Included(to),
            None => Bound::Unbounded,
        };
        if let (Bound::Excluded(from), Bound::Included(to)) = (lower, upper) {
            // BTreeMap::range panics on an inverted range
            if from >= to {
                return Ok(Vec::new());
            }
        }
        Ok(rows
            .range::<str, _>((lower, upper))
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn count_keys(&self, table: &str) -> SorResult<u64> {
        let tables = self
            .tables
            .try_read()
            .ok_or_else(|| SorError::concurrent_modification(table, ""))?;
        Ok(tables.get(table).map_or(0, |rows| rows.len() as u64))
    }

    fn purge_table(&self, table: &str) -> SorResult<()> {
        self.tables.write().remove(table);
        Ok(())
    }
}
