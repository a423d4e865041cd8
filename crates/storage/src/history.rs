//! Delta-history archive
//!
//! Compaction deletes raw deltas; the archive keeps a per-change snapshot
//! of the document so audit and rollback survive compaction.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use sor_core::{ChangeId, History, SorResult};

/// Archive of compacted delta history, keyed by document
pub trait HistoryStore: Send + Sync {
    /// Append `batch` to the history of `(table, key)`
    ///
    /// Appending an entry whose `change_id` is already archived replaces it,
    /// so replaying a compaction does not duplicate history.
    fn append_history(&self, table: &str, key: &str, batch: &[History]) -> SorResult<()>;

    /// Archived history of `(table, key)` in ascending change order
    fn get_history(&self, table: &str, key: &str) -> SorResult<Vec<History>>;
}

/// In-process history archive
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    histories: RwLock<FxHashMap<(String, String), BTreeMap<ChangeId, History>>>,
}

impl InMemoryHistoryStore {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append_history(&self, table: &str, key: &str, batch: &[History]) -> SorResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut histories = self.histories.write();
        let entries = histories
            .entry((table.to_string(), key.to_string()))
            .or_default();
        for history in batch {
            entries.insert(history.change_id, history.clone());
        }
        Ok(())
    }

    fn get_history(&self, table: &str, key: &str) -> SorResult<Vec<History>> {
        let histories = self.histories.read();
        Ok(histories
            .get(&(table.to_string(), key.to_string()))
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }
}
