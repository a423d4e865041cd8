//! Timeline entries
//!
//! Every entry in a document's timeline is a `Change`: either a delta to
//! apply on top of prior state, or a compaction that materializes the state
//! up to a cutoff. Changes are immutable once written.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use crate::change_id::ChangeId;
use crate::delta::Delta;

/// One timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    id: ChangeId,
    body: ChangeBody,
}

/// What a timeline entry carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeBody {
    /// Incremental mutation with optional audit tags
    Delta {
        /// Mutation to apply
        delta: Delta,
        /// Caller-supplied tags recorded with the write
        tags: BTreeSet<String>,
    },
    /// Materialized state subsuming a prefix of the timeline
    Compaction(Compaction),
}

impl Change {
    /// Delta entry
    pub fn delta(id: ChangeId, delta: Delta, tags: BTreeSet<String>) -> Self {
        Change {
            id,
            body: ChangeBody::Delta { delta, tags },
        }
    }

    /// Compaction entry
    pub fn compaction(id: ChangeId, compaction: Compaction) -> Self {
        Change {
            id,
            body: ChangeBody::Compaction(compaction),
        }
    }

    /// Identifier of this entry
    pub fn id(&self) -> ChangeId {
        self.id
    }

    /// Entry payload
    pub fn body(&self) -> &ChangeBody {
        &self.body
    }

    /// The delta, if this is a delta entry
    pub fn as_delta(&self) -> Option<&Delta> {
        match &self.body {
            ChangeBody::Delta { delta, .. } => Some(delta),
            ChangeBody::Compaction(_) => None,
        }
    }

    /// The compaction, if this is a compaction entry
    pub fn as_compaction(&self) -> Option<&Compaction> {
        match &self.body {
            ChangeBody::Compaction(c) => Some(c),
            ChangeBody::Delta { .. } => None,
        }
    }

    /// Tags of a delta entry; compactions have none
    pub fn tags(&self) -> Option<&BTreeSet<String>> {
        match &self.body {
            ChangeBody::Delta { tags, .. } => Some(tags),
            ChangeBody::Compaction(_) => None,
        }
    }

    /// True for compaction entries
    pub fn is_compaction(&self) -> bool {
        matches!(self.body, ChangeBody::Compaction(_))
    }
}

/// Materialized state of a document up to and including `cutoff`
///
/// Readers take the most recent compaction as their base state and apply
/// only the deltas whose ids are greater than `cutoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compaction {
    /// Number of deltas folded into this compaction, transitively
    pub count: u64,
    /// Earliest change folded in
    pub first: ChangeId,
    /// Latest change folded in
    pub cutoff: ChangeId,
    /// Latest folded change that altered the content
    pub last_content_mutation: ChangeId,
    /// Latest folded change of any kind, including content no-ops
    pub last_mutation: ChangeId,
    /// Delta that recreates the compacted state from nothing
    pub compacted_delta: Delta,
    /// Tags of the last folded delta
    pub last_tags: BTreeSet<String>,
}

/// Identifies one timeline entry for deletion
///
/// `num_blocks` counts the physical sub-rows one logical change spans in
/// backends that fragment large changes. In-memory backends always use 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeltaClusteringKey {
    /// Entry being addressed
    pub change_id: ChangeId,
    /// Physical sub-rows spanned
    pub num_blocks: u32,
}

impl DeltaClusteringKey {
    /// Address a change stored as a single block
    pub fn single(change_id: ChangeId) -> Self {
        DeltaClusteringKey {
            change_id,
            num_blocks: 1,
        }
    }
}

/// Archived snapshot of a document at one change
///
/// Written to the delta-history store when deltas are compacted away so
/// the audit trail survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Change the snapshot was taken after
    pub change_id: ChangeId,
    /// Resolved content after the change; `None` if deleted
    pub content: Option<JsonValue>,
    /// The delta that produced this state
    pub delta: Delta,
}
