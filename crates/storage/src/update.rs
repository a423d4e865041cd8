//! Batched delta writes

use std::collections::BTreeSet;

use sor_core::{ChangeId, Delta, WriteConsistency};

/// One delta to append to a document's timeline
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    /// Target table
    pub table: String,
    /// Target row key
    pub key: String,
    /// Id of the new timeline entry
    pub change_id: ChangeId,
    /// Mutation to record
    pub delta: Delta,
    /// Audit tags recorded with the delta
    pub tags: BTreeSet<String>,
    /// Replica acknowledgement required
    pub consistency: WriteConsistency,
}

impl RecordUpdate {
    /// Strongly consistent untagged update
    pub fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        change_id: ChangeId,
        delta: Delta,
    ) -> Self {
        RecordUpdate {
            table: table.into(),
            key: key.into(),
            change_id,
            delta,
            tags: BTreeSet::new(),
            consistency: WriteConsistency::Strong,
        }
    }

    /// Attach audit tags
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }
}

/// Observer notified around each write of `update_all`
pub trait UpdateListener {
    /// Called before `updates` are written
    fn before_write(&mut self, updates: &[RecordUpdate]);

    /// Called after `updates` were written successfully
    fn after_write(&mut self, updates: &[RecordUpdate]);
}

/// Listener that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUpdateListener;

impl UpdateListener for NoopUpdateListener {
    fn before_write(&mut self, _updates: &[RecordUpdate]) {}

    fn after_write(&mut self, _updates: &[RecordUpdate]) {}
}
