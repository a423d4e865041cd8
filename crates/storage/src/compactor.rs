//! Timeline compaction planning
//!
//! A plan folds the deltas that every replica has converged on into one
//! compaction:
//!
//! 1. The base is the compaction with the greatest cutoff, if any.
//! 2. Deltas newer than the base cutoff whose timestamps are at or before
//!    the full-consistency watermark are folded onto the base, in id order.
//!    Folding stops at the first delta past the watermark.
//! 3. Every compaction, every delta at or below the base cutoff and every
//!    folded delta is listed for deletion.
//!
//! Deltas past the watermark stay in the timeline, so resolving the
//! compacted timeline yields the same state as resolving the original.
//! Nothing is planned when fewer than two entries would be replaced.

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;
use tracing::debug;

use sor_core::{
    ChangeBody, ChangeId, Compaction, Delta, DeltaClusteringKey, History, Key, ReadConsistency,
    SorResult, Timestamp, WriteConsistency,
};

use crate::dao::{CompactionReport, CompactionRequest, DataDao, DataReader, DataWriter};
use crate::record::Record;

/// A computed compaction and what it folded
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionPlan {
    /// Request to hand to `DataWriter::compact` or its halves
    pub request: CompactionRequest,
    /// Number of deltas folded in this round
    pub folded: usize,
}

/// Plans and applies timeline compactions
#[derive(Debug, Default, Clone, Copy)]
pub struct Compactor {
    consistency: WriteConsistency,
}

struct FoldState {
    content: Option<JsonValue>,
    count: u64,
    first: Option<ChangeId>,
    cutoff: Option<ChangeId>,
    last_content_mutation: Option<ChangeId>,
    last_mutation: Option<ChangeId>,
    last_delta: Option<Delta>,
    last_tags: BTreeSet<String>,
}

impl FoldState {
    fn from_base(base: Option<&Compaction>) -> Self {
        match base {
            Some(base) => FoldState {
                content: base.compacted_delta.apply(None),
                count: base.count,
                first: Some(base.first),
                cutoff: Some(base.cutoff),
                last_content_mutation: Some(base.last_content_mutation),
                last_mutation: Some(base.last_mutation),
                last_delta: Some(base.compacted_delta.clone()),
                last_tags: base.last_tags.clone(),
            },
            None => FoldState {
                content: None,
                count: 0,
                first: None,
                cutoff: None,
                last_content_mutation: None,
                last_mutation: None,
                last_delta: None,
                last_tags: BTreeSet::new(),
            },
        }
    }

    fn fold(&mut self, id: ChangeId, delta: &Delta, tags: &BTreeSet<String>) -> History {
        let previous = self.content.take();
        let next = delta.apply(previous.clone());
        if next != previous {
            self.last_content_mutation = Some(id);
        }
        self.content = next;
        self.count += 1;
        self.first.get_or_insert(id);
        self.cutoff = Some(id);
        self.last_mutation = Some(id);
        self.last_delta = Some(delta.clone());
        self.last_tags = tags.clone();
        History {
            change_id: id,
            content: self.content.clone(),
            delta: delta.clone(),
        }
    }
}

impl Compactor {
    /// Compactor writing with `consistency`
    pub fn new(consistency: WriteConsistency) -> Self {
        Compactor { consistency }
    }

    /// Plan a compaction of `record` against `watermark`
    ///
    /// Returns `None` when fewer than two entries would be replaced.
    pub fn plan(&self, record: &Record, watermark: Timestamp) -> SorResult<Option<CompactionPlan>> {
        let mut entries = Vec::new();
        for entry in record.pass_two() {
            let (key, change) = entry?;
            entries.push((key, change));
        }

        let base = entries
            .iter()
            .filter_map(|(_, change)| change.as_compaction())
            .fold(None::<&Compaction>, |best, c| match best {
                Some(b) if b.cutoff >= c.cutoff => Some(b),
                _ => Some(c),
            });
        let base_cutoff = base.map(|b| b.cutoff);

        let mut state = FoldState::from_base(base);
        let mut to_delete: Vec<DeltaClusteringKey> = Vec::new();
        let mut history = Vec::new();
        let mut folding = true;
        for (key, change) in &entries {
            let id = key.change_id;
            match change.body() {
                ChangeBody::Compaction(_) => to_delete.push(*key),
                ChangeBody::Delta { delta, tags } => {
                    if base_cutoff.map_or(false, |cutoff| id <= cutoff) {
                        to_delete.push(*key);
                    } else if folding && id.timestamp() <= watermark {
                        history.push(state.fold(id, delta, tags));
                        to_delete.push(*key);
                    } else {
                        folding = false;
                    }
                }
            }
        }

        if to_delete.len() < 2 {
            return Ok(None);
        }
        let (Some(first), Some(cutoff), Some(last_mutation), Some(latest_delta)) = (
            state.first,
            state.cutoff,
            state.last_mutation,
            state.last_delta.clone(),
        ) else {
            return Ok(None);
        };

        let compacted_delta = Delta::from_state(state.content.clone());
        let compaction = Compaction {
            count: state.count,
            first,
            cutoff,
            last_content_mutation: state.last_content_mutation.unwrap_or(first),
            last_mutation,
            compacted_delta,
            last_tags: state.last_tags,
        };
        let folded = history.len();
        let key = record.key();
        debug!(
            target: "sor::compaction",
            key = %key,
            folded,
            replaced = to_delete.len(),
            cutoff = %cutoff,
            watermark = %watermark,
            "Planned compaction"
        );
        Ok(Some(CompactionPlan {
            request: CompactionRequest {
                table: key.table().to_string(),
                key: key.key().to_string(),
                compaction_id: ChangeId::now(),
                compaction,
                latest_change_id: cutoff,
                latest_delta,
                entries_to_delete: to_delete,
                history,
                consistency: self.consistency,
            },
            folded,
        }))
    }

    /// Apply `plan` in one call
    pub fn compact(&self, dao: &dyn DataWriter, plan: &CompactionPlan) -> SorResult<CompactionReport> {
        dao.compact(&plan.request)
    }

    /// Read, plan and compact one document against the DAO's watermark
    pub fn compact_key(
        &self,
        dao: &DataDao,
        key: &Key,
    ) -> SorResult<Option<CompactionReport>> {
        let record = dao.read(key, ReadConsistency::Strong)?;
        let watermark = dao.full_consistency_timestamp(key.table());
        match self.plan(&record, watermark)? {
            Some(plan) => self.compact(dao, &plan).map(Some),
            None => Ok(None),
        }
    }
}
