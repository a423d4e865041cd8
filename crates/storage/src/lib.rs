//! Storage layer for the system of record
//!
//! This crate implements timeline storage and the data access object:
//! - TimelineStore: per-document change log contract + in-memory backend
//! - HistoryStore: archive of compacted delta history
//! - Record: two-pass view over a timeline snapshot with a lazy tail
//! - Resolved: fold of a record into current document state
//! - DataDao: reads, scans, splits, updates and compaction
//! - Compactor: plans compactions against the consistency watermark
//!
//! # Concurrency
//!
//! Nothing here holds a lock across calls. Reads that race a writer are
//! retried with randomized backoff (see `retry`); compactions are
//! idempotent and may race each other on the same key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compactor;
pub mod consistency;
pub mod dao;
pub mod history;
pub mod record;
pub mod resolve;
pub mod retry;
pub mod scan_range;
pub mod split;
pub mod timeline;
pub mod update;

pub use compactor::{CompactionPlan, Compactor};
pub use consistency::{ConsistencyTracker, DEFAULT_FULL_CONSISTENCY_DELAY};
pub use dao::{
    CompactionReport, CompactionRequest, DaoConfig, DataDao, DataReader, DataWriter,
    HistoryArchival, RecordIter, TimelineQuery, DEFAULT_COLUMN_BATCH_SIZE,
    LOCAL_PLACEMENT_CLUSTER,
};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use record::{Record, RecordEntryRawMetadata};
pub use resolve::Resolved;
pub use retry::{RetryPolicy, DEFAULT_MAX_BACKOFF};
pub use scan_range::{HostRanges, ScanRange, ScanRangeSplits, ScanRangeSplitsBuilder, SplitGroup};
pub use split::SplitRange;
pub use timeline::{InMemoryTimelineStore, Timeline, TimelineStore};
pub use update::{NoopUpdateListener, RecordUpdate, UpdateListener};
