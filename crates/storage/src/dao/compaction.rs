//! Compaction requests and their outcomes

use std::fmt;

use sor_core::{
    validate_row_key, validate_table_name, ChangeId, Compaction, Delta, DeltaClusteringKey,
    History, SorError, SorResult, WriteConsistency,
};

/// Everything needed to replace part of a timeline with one compaction
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionRequest {
    /// Target table
    pub table: String,
    /// Target row key
    pub key: String,
    /// Id the compaction entry is written at
    pub compaction_id: ChangeId,
    /// Consolidated state
    pub compaction: Compaction,
    /// Last change folded into `compaction`; equals its cutoff
    pub latest_change_id: ChangeId,
    /// Delta of the last folded change
    ///
    /// Backends that cache the newest delta next to the compaction use
    /// it; the in-process backend does not.
    pub latest_delta: Delta,
    /// Entries subsumed by `compaction`
    pub entries_to_delete: Vec<DeltaClusteringKey>,
    /// History to archive; empty to skip archival
    pub history: Vec<History>,
    /// Replica acknowledgement required
    pub consistency: WriteConsistency,
}

impl CompactionRequest {
    pub(crate) fn validate(&self) -> SorResult<()> {
        validate_table_name(&self.table)?;
        validate_row_key(&self.key)?;
        if self.latest_change_id != self.compaction.cutoff {
            return Err(SorError::invalid_input(format!(
                "latest change {} does not match compaction cutoff {}",
                self.latest_change_id, self.compaction.cutoff
            )));
        }
        if self
            .entries_to_delete
            .iter()
            .any(|entry| entry.change_id == self.compaction_id)
        {
            return Err(SorError::invalid_input(format!(
                "compaction {} would delete itself",
                self.compaction_id
            )));
        }
        Ok(())
    }

    pub(crate) fn delete_ids(&self) -> Vec<ChangeId> {
        self.entries_to_delete.iter().map(|e| e.change_id).collect()
    }
}

/// Result of archiving history during compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryArchival {
    /// No history was requested, or this half does not archive
    Skipped,
    /// Entries appended to the archive
    Archived(usize),
    /// Archive write failed; the timeline changes still took effect
    Failed(String),
}

impl HistoryArchival {
    /// True if the archive write failed
    pub fn is_failed(&self) -> bool {
        matches!(self, HistoryArchival::Failed(_))
    }

    /// Archive failure as an error, if any
    pub fn error(&self) -> Option<SorError> {
        match self {
            HistoryArchival::Failed(message) => Some(SorError::history_archive(message.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryArchival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryArchival::Skipped => f.write_str("skipped"),
            HistoryArchival::Archived(n) => write!(f, "archived {}", n),
            HistoryArchival::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// What one compaction call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Entries the call removed (already-absent entries included)
    pub deleted: usize,
    /// True if the compaction entry was written
    pub compaction_written: bool,
    /// History archival outcome
    pub history: HistoryArchival,
}
