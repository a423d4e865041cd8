//! Per-read view of one document's timeline
//!
//! A `Record` binds a `Key` to a snapshot of its timeline taken at read time
//! and exposes it as three sequences:
//!
//! - **pass one**: compactions only, ascending by `ChangeId`
//! - **pass two**: every entry, ascending by `ChangeId`
//! - **raw metadata**: per-entry timestamp and size estimate
//!
//! # Batch iteration
//!
//! Backends fetch a bounded first batch of entries synchronously and page
//! the rest on demand. A record models that: the first `column_batch_size`
//! entries of the snapshot are held eagerly. If the snapshot filled the
//! batch, the remainder is NOT taken from the snapshot; it is re-read from
//! the live store when iteration runs past the prefix, restricted to ids
//! strictly greater than the last prefix id. Entries written after the read
//! therefore show up in the tail, while the prefix never changes.
//!
//! Tail reads that race a writer are retried with `RetryPolicy`; callers
//! never see `ConcurrentModification`. Abandoning an iterator at any point
//! has no side effects.

use std::collections::btree_map;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use sor_core::{Change, ChangeBody, ChangeId, Compaction, DeltaClusteringKey, Key, SorResult};

use crate::retry::RetryPolicy;
use crate::timeline::{Timeline, TimelineStore};

/// Diagnostic metadata for one timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordEntryRawMetadata {
    /// Creation time derived from the entry's `ChangeId`
    pub timestamp_millis: u64,
    /// Approximate stored size in bytes
    pub size: u64,
}

/// Ephemeral two-pass view over one document's timeline
#[derive(Clone)]
pub struct Record {
    key: Key,
    prefix: Arc<[(ChangeId, Change)]>,
    tail: Option<TailSource>,
}

#[derive(Clone)]
struct TailSource {
    key: Key,
    store: Arc<dyn TimelineStore>,
    exclusive_from: ChangeId,
    retry: RetryPolicy,
}

impl Record {
    /// Build a record from a snapshot just read from `store`
    ///
    /// `column_batch_size` must be at least 1.
    pub(crate) fn new(
        key: Key,
        snapshot: Timeline,
        store: Arc<dyn TimelineStore>,
        column_batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        debug_assert!(column_batch_size >= 1);
        if snapshot.len() < column_batch_size {
            return Record {
                key,
                prefix: snapshot.into_iter().collect(),
                tail: None,
            };
        }

        let prefix: Arc<[(ChangeId, Change)]> =
            snapshot.into_iter().take(column_batch_size).collect();
        let tail = prefix.last().map(|(last, _)| TailSource {
            key: key.clone(),
            store,
            exclusive_from: *last,
            retry,
        });
        Record { key, prefix, tail }
    }

    /// Document this record was read for
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Compactions in ascending id order
    pub fn pass_one(
        &self,
    ) -> impl Iterator<Item = SorResult<(DeltaClusteringKey, Compaction)>> + Send {
        self.entries().filter_map(|entry| match entry {
            Ok((id, change)) => match change.body() {
                ChangeBody::Compaction(compaction) => {
                    Some(Ok((DeltaClusteringKey::single(id), compaction.clone())))
                }
                ChangeBody::Delta { .. } => None,
            },
            Err(e) => Some(Err(e)),
        })
    }

    /// Every entry in ascending id order
    pub fn pass_two(&self) -> impl Iterator<Item = SorResult<(DeltaClusteringKey, Change)>> + Send {
        self.entries()
            .map(|entry| entry.map(|(id, change)| (DeltaClusteringKey::single(id), change)))
    }

    /// Timestamp and size estimate per entry, in ascending id order
    ///
    /// The size is the serialized size of the entry, a stand-in for the raw
    /// column size a persistent backend would report.
    pub fn raw_metadata(&self) -> impl Iterator<Item = SorResult<RecordEntryRawMetadata>> + Send {
        self.entries().map(|entry| {
            let (id, change) = entry?;
            Ok(RecordEntryRawMetadata {
                timestamp_millis: id.timestamp_millis(),
                size: bincode::serialized_size(&change)?,
            })
        })
    }

    /// True if the timeline had no entries when read
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Number of entries held eagerly
    pub fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    /// True if iteration past the prefix re-reads the live timeline
    pub fn has_lazy_tail(&self) -> bool {
        self.tail.is_some()
    }

    fn entries(&self) -> TimelineIter {
        TimelineIter {
            prefix: Arc::clone(&self.prefix),
            pos: 0,
            tail: match &self.tail {
                Some(source) => TailState::Pending(source.clone()),
                None => TailState::Done,
            },
        }
    }
}

/// Reads snapshots from a store and wraps them as records
#[derive(Clone)]
pub(crate) struct RecordReader {
    pub(crate) store: Arc<dyn TimelineStore>,
    pub(crate) column_batch_size: usize,
    pub(crate) retry: RetryPolicy,
}

impl RecordReader {
    /// Snapshot `key`'s timeline, retrying concurrent modifications
    pub(crate) fn read(&self, key: Key) -> SorResult<Record> {
        let snapshot = self.retry.run(|| self.store.get(key.table(), key.key()))?;
        Ok(Record::new(
            key,
            snapshot,
            Arc::clone(&self.store),
            self.column_batch_size,
            self.retry,
        ))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("prefix_len", &self.prefix.len())
            .field("has_lazy_tail", &self.tail.is_some())
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

impl TailSource {
    fn load(&self) -> SorResult<btree_map::IntoIter<ChangeId, Change>> {
        let mut timeline = self
            .retry
            .run(|| self.store.get(self.key.table(), self.key.key()))?;
        let mut tail = timeline.split_off(&self.exclusive_from);
        tail.remove(&self.exclusive_from);
        debug!(
            target: "sor::record",
            key = %self.key,
            after = %self.exclusive_from,
            entries = tail.len(),
            "Loaded lazy tail"
        );
        Ok(tail.into_iter())
    }
}

/// Eager prefix followed by a lazily loaded tail
struct TimelineIter {
    prefix: Arc<[(ChangeId, Change)]>,
    pos: usize,
    tail: TailState,
}

enum TailState {
    Pending(TailSource),
    Streaming(btree_map::IntoIter<ChangeId, Change>),
    Done,
}

impl Iterator for TimelineIter {
    type Item = SorResult<(ChangeId, Change)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((id, change)) = self.prefix.get(self.pos) {
            self.pos += 1;
            return Some(Ok((*id, change.clone())));
        }
        loop {
            match std::mem::replace(&mut self.tail, TailState::Done) {
                TailState::Pending(source) => match source.load() {
                    Ok(iter) => self.tail = TailState::Streaming(iter),
                    Err(e) => return Some(Err(e)),
                },
                TailState::Streaming(mut iter) => {
                    let next = iter.next();
                    if next.is_some() {
                        self.tail = TailState::Streaming(iter);
                    }
                    return next.map(Ok);
                }
                TailState::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::InMemoryTimelineStore;
    use serde_json::json;
    use sor_core::Delta;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn delta_at(ms: u64) -> Change {
        Change::delta(
            ChangeId::from_millis(ms),
            Delta::literal(json!(ms)),
            BTreeSet::new(),
        )
    }

    fn compaction_at(ms: u64, cutoff: ChangeId) -> Change {
        Change::compaction(
            ChangeId::from_millis(ms),
            Compaction {
                count: 1,
                first: cutoff,
                cutoff,
                last_content_mutation: cutoff,
                last_mutation: cutoff,
                compacted_delta: Delta::literal(json!("base")),
                last_tags: BTreeSet::new(),
            },
        )
    }

    fn read(store: &Arc<InMemoryTimelineStore>, batch: usize) -> Record {
        let key = Key::new("t", "k").unwrap();
        let snapshot = store.get("t", "k").unwrap();
        let store: Arc<dyn TimelineStore> = Arc::clone(store) as Arc<dyn TimelineStore>;
        Record::new(
            key,
            snapshot,
            store,
            batch,
            RetryPolicy {
                max_backoff: Duration::from_millis(1),
            },
        )
    }

    fn ids(record: &Record) -> Vec<ChangeId> {
        record
            .pass_two()
            .map(|entry| entry.unwrap().0.change_id)
            .collect()
    }

    #[test]
    fn test_short_timeline_has_no_tail() {
        let store = Arc::new(InMemoryTimelineStore::new());
        store.put("t", "k", delta_at(1)).unwrap();
        let record = read(&store, 50);
        assert!(!record.has_lazy_tail());
        assert_eq!(record.prefix_len(), 1);

        // Writes after the read are invisible without a tail
        store.put("t", "k", delta_at(2)).unwrap();
        assert_eq!(ids(&record).len(), 1);
    }

    #[test]
    fn test_pass_one_filters_compactions() {
        let store = Arc::new(InMemoryTimelineStore::new());
        let d1 = delta_at(1_000);
        let c = compaction_at(3_000, d1.id());
        store.put("t", "k", d1.clone()).unwrap();
        store.put("t", "k", delta_at(2_000)).unwrap();
        store.put("t", "k", c.clone()).unwrap();

        let record = read(&store, 50);
        let pass_one: Vec<_> = record.pass_one().map(|e| e.unwrap()).collect();
        assert_eq!(pass_one.len(), 1);
        assert_eq!(pass_one[0].0, DeltaClusteringKey::single(c.id()));
        assert_eq!(pass_one[0].1.cutoff, d1.id());
        assert_eq!(ids(&record).len(), 3);
    }

    #[test]
    fn test_full_batch_reads_live_tail() {
        let store = Arc::new(InMemoryTimelineStore::new());
        for ms in [1_000, 2_000, 3_000] {
            store.put("t", "k", delta_at(ms)).unwrap();
        }
        let record = read(&store, 2);
        assert!(record.has_lazy_tail());
        assert_eq!(record.prefix_len(), 2);

        let before: Vec<ChangeId> = ids(&record);
        assert_eq!(before.len(), 3);

        let late = delta_at(4_000);
        store.put("t", "k", late.clone()).unwrap();
        let after = ids(&record);
        assert_eq!(&after[..3], &before[..]);
        assert_eq!(after[3], late.id());
    }

    #[test]
    fn test_tail_skips_entries_before_cutoff() {
        let store = Arc::new(InMemoryTimelineStore::new());
        for ms in [1_000, 2_000] {
            store.put("t", "k", delta_at(ms)).unwrap();
        }
        let record = read(&store, 2);

        // Older than the prefix cutoff: not part of the tail
        store.put("t", "k", delta_at(500)).unwrap();
        assert_eq!(ids(&record).len(), 2);
    }

    #[test]
    fn test_raw_metadata_timestamps() {
        let store = Arc::new(InMemoryTimelineStore::new());
        store.put("t", "k", delta_at(1_000)).unwrap();
        store.put("t", "k", delta_at(2_000)).unwrap();
        let record = read(&store, 50);
        let meta: Vec<RecordEntryRawMetadata> =
            record.raw_metadata().map(|m| m.unwrap()).collect();
        assert_eq!(meta[0].timestamp_millis, 1_000);
        assert_eq!(meta[1].timestamp_millis, 2_000);
        assert!(meta.iter().all(|m| m.size > 0));
    }

    #[test]
    fn test_sequences_are_restartable() {
        let store = Arc::new(InMemoryTimelineStore::new());
        store.put("t", "k", delta_at(1_000)).unwrap();
        let record = read(&store, 1);
        assert_eq!(ids(&record), ids(&record));
        assert_eq!(record.to_string(), "t/k");
    }
}
