//! Folding a record into current document state
//!
//! Pass one picks the base: the compaction with the greatest cutoff. Pass
//! two then applies, in id order, every delta with an id greater than that
//! cutoff. Compaction entries in pass two are skipped; entries at or below
//! the cutoff are already reflected in the base.
//!
//! The fold does not record which compaction it started from, so a
//! timeline and its compacted equivalent resolve to equal values.

use serde_json::Value as JsonValue;

use sor_core::{ChangeBody, ChangeId, Compaction, Key, SorResult, Timestamp};

use crate::record::Record;

/// Current state of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Document the state belongs to
    pub key: Key,
    /// Content; `None` if the document does not exist
    pub content: Option<JsonValue>,
    /// Number of deltas reflected in `content`
    pub version: u64,
    /// Creation time of the first delta reflected
    pub first_update_at: Option<Timestamp>,
    /// Creation time of the last delta reflected
    pub last_update_at: Option<Timestamp>,
    /// Id of the last delta reflected
    pub last_mutation: Option<ChangeId>,
}

impl Resolved {
    /// Fold both passes of `record`
    pub fn from_record(record: &Record) -> SorResult<Self> {
        let mut base: Option<Compaction> = None;
        for entry in record.pass_one() {
            let (_, compaction) = entry?;
            if base.as_ref().map_or(true, |b| compaction.cutoff > b.cutoff) {
                base = Some(compaction);
            }
        }

        let mut resolved = Resolved {
            key: record.key().clone(),
            content: None,
            version: 0,
            first_update_at: None,
            last_update_at: None,
            last_mutation: None,
        };
        let cutoff = base.as_ref().map(|b| b.cutoff);
        if let Some(base) = &base {
            resolved.content = base.compacted_delta.apply(None);
            resolved.version = base.count;
            resolved.first_update_at = Some(base.first.timestamp());
            resolved.last_update_at = Some(base.last_mutation.timestamp());
            resolved.last_mutation = Some(base.last_mutation);
        }

        for entry in record.pass_two() {
            let (key, change) = entry?;
            let id = key.change_id;
            if cutoff.map_or(false, |cutoff| id <= cutoff) {
                continue;
            }
            if let ChangeBody::Delta { delta, .. } = change.body() {
                resolved.content = delta.apply(resolved.content.take());
                resolved.version += 1;
                resolved.first_update_at.get_or_insert(id.timestamp());
                resolved.last_update_at = Some(id.timestamp());
                resolved.last_mutation = Some(id);
            }
        }
        Ok(resolved)
    }

    /// True if the document exists
    pub fn exists(&self) -> bool {
        self.content.is_some()
    }
}
