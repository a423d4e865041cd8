//! Data access object for the system of record
//!
//! `DataDao` reads and writes document timelines on a `TimelineStore` and
//! archives compacted deltas to a `HistoryStore`. It is split into two
//! capabilities:
//!
//! - `DataReader`: records, scans, splits, counts and consistency watermarks
//! - `DataWriter`: delta appends, compaction, history archival and purge
//!
//! Every method validates table and row-key identifiers before touching the
//! store and fails with `SorError::InvalidInput` on a bad one.
//!
//! ## Reads
//!
//! A read snapshots one timeline and wraps it as a `Record` (see
//! `crate::record` for batch iteration). Scans and splits page through row
//! keys lazily, so iterating a huge table never materializes the key set.
//! Reads that race a writer are retried internally.
//!
//! ## Compaction
//!
//! `compact` is the one-shot form of two independent, idempotent halves:
//! `add_compaction_only` writes the compaction and archives history, and
//! `delete_deltas_only` removes the entries it replaced. Running the halves
//! in that order (or `compact` itself) never exposes a state in which the
//! deltas are gone but the compaction is not yet visible.

mod compaction;
mod reader;
mod scan;
mod writer;

pub use compaction::{CompactionReport, CompactionRequest, HistoryArchival};
pub use scan::RecordIter;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sor_core::{
    validate_row_key, validate_table_name, Change, ChangeId, Clock, History, Key,
    ReadConsistency, SorError, SorResult, SystemClock, Timestamp, WriteConsistency,
};

use crate::consistency::{ConsistencyTracker, DEFAULT_FULL_CONSISTENCY_DELAY};
use crate::history::HistoryStore;
use crate::record::{Record, RecordReader};
use crate::retry::{RetryPolicy, DEFAULT_MAX_BACKOFF};
use crate::scan_range::{ScanRange, ScanRangeSplits};
use crate::timeline::TimelineStore;
use crate::update::{RecordUpdate, UpdateListener};

/// Default number of timeline entries read eagerly per record
pub const DEFAULT_COLUMN_BATCH_SIZE: usize = 50;

/// Default number of row keys fetched per scan page
pub const DEFAULT_KEY_PAGE_SIZE: usize = 1_000;

/// Cluster name reported for every placement by a single-process backend
pub const LOCAL_PLACEMENT_CLUSTER: &str = "process";

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for `DataDao`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Entries per record held eagerly before the lazy tail kicks in
    pub column_batch_size: usize,
    /// Row keys fetched per page while scanning or splitting
    pub key_page_size: usize,
    /// How far the full-consistency watermark trails the clock
    #[serde(with = "duration_millis")]
    pub full_consistency_delay: Duration,
    /// Fixed full-consistency watermark, overriding the delay
    pub full_consistency_timestamp: Option<Timestamp>,
    /// Upper bound on one retry backoff sleep
    #[serde(with = "duration_millis")]
    pub max_retry_backoff: Duration,
}

impl Default for DaoConfig {
    fn default() -> Self {
        DaoConfig {
            column_batch_size: DEFAULT_COLUMN_BATCH_SIZE,
            key_page_size: DEFAULT_KEY_PAGE_SIZE,
            full_consistency_delay: DEFAULT_FULL_CONSISTENCY_DELAY,
            full_consistency_timestamp: None,
            max_retry_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl DaoConfig {
    /// Reject values the DAO cannot operate with
    pub fn validate(&self) -> SorResult<()> {
        if self.column_batch_size == 0 {
            return Err(SorError::invalid_input("column_batch_size must be at least 1"));
        }
        if self.key_page_size == 0 {
            return Err(SorError::invalid_input("key_page_size must be at least 1"));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Bounds and direction of a `read_timeline` query
///
/// The bounds select an id range; `reversed` only changes the order in
/// which that range is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineQuery {
    /// Return timeline entries at all; `false` yields nothing
    pub include_content_data: bool,
    /// Lowest id returned, inclusive
    pub start: Option<ChangeId>,
    /// Highest id returned, inclusive
    pub end: Option<ChangeId>,
    /// Traverse newest first
    pub reversed: bool,
    /// Maximum number of entries returned; must be at least 1
    pub limit: usize,
}

impl Default for TimelineQuery {
    fn default() -> Self {
        TimelineQuery {
            include_content_data: true,
            start: None,
            end: None,
            reversed: false,
            limit: usize::MAX,
        }
    }
}

/// Read side of the system of record
pub trait DataReader: Send + Sync {
    /// Watermark at or before which all replicas of `table` have converged
    fn full_consistency_timestamp(&self, table: &str) -> Timestamp;

    /// Best-effort convergence watermark for `table`
    fn raw_consistency_timestamp(&self, table: &str) -> Timestamp;

    /// Number of documents in `table`
    fn count(&self, table: &str, consistency: ReadConsistency) -> SorResult<u64>;

    /// Number of documents in `table`, capped at `limit`
    fn count_with_limit(
        &self,
        table: &str,
        limit: Option<u64>,
        consistency: ReadConsistency,
    ) -> SorResult<u64>;

    /// Snapshot one document's timeline
    fn read(&self, key: &Key, consistency: ReadConsistency) -> SorResult<Record>;

    /// Lazily read several documents, one record per key in input order
    fn read_all(&self, keys: Vec<Key>, consistency: ReadConsistency) -> RecordIter<'_>;

    /// Selected timeline entries of one document
    fn read_timeline(
        &self,
        key: &Key,
        query: &TimelineQuery,
        consistency: ReadConsistency,
    ) -> SorResult<Vec<Change>>;

    /// Archived history of one document between `start` and `end`, inclusive
    fn get_existing_histories(
        &self,
        key: &Key,
        start: Option<ChangeId>,
        end: Option<ChangeId>,
        consistency: ReadConsistency,
    ) -> SorResult<Vec<History>>;

    /// Lazily read documents of `table` in ascending key order
    fn scan(
        &self,
        table: &str,
        from_key_exclusive: Option<&str>,
        limit: Option<usize>,
        consistency: ReadConsistency,
    ) -> SorResult<RecordIter<'_>>;

    /// Partition `table` into split tokens of about
    /// `records_per_split / 2^resplit_depth` documents each
    fn get_splits(
        &self,
        table: &str,
        records_per_split: usize,
        resplit_depth: u32,
    ) -> SorResult<Vec<String>>;

    /// Lazily read the documents of one split token
    fn get_split(
        &self,
        table: &str,
        split: &str,
        from_key_exclusive: Option<&str>,
        limit: Option<usize>,
        consistency: ReadConsistency,
    ) -> SorResult<RecordIter<'_>>;

    /// Placement-level scan ranges
    fn get_scan_range_splits(
        &self,
        placement: &str,
        desired_records_per_split: usize,
        subrange: Option<ScanRange>,
    ) -> SorResult<ScanRangeSplits>;

    /// Cluster serving `placement`
    fn placement_cluster(&self, placement: &str) -> String;
}

/// Write side of the system of record
pub trait DataWriter: Send + Sync {
    /// Append one delta
    fn update(&self, update: &RecordUpdate) -> SorResult<()>;

    /// Append deltas one at a time, notifying `listener` around each write
    fn update_all(
        &self,
        updates: &mut dyn Iterator<Item = RecordUpdate>,
        listener: &mut dyn UpdateListener,
    ) -> SorResult<()>;

    /// Replace entries with a compaction and archive their history
    fn compact(&self, request: &CompactionRequest) -> SorResult<CompactionReport>;

    /// Remove the entries a compaction replaced
    fn delete_deltas_only(&self, request: &CompactionRequest) -> SorResult<CompactionReport>;

    /// Write a compaction and archive history without removing anything
    fn add_compaction_only(&self, request: &CompactionRequest) -> SorResult<CompactionReport>;

    /// Archive history entries for one document
    fn store_compacted_deltas(
        &self,
        key: &Key,
        histories: &[History],
        consistency: WriteConsistency,
    ) -> SorResult<()>;

    /// Drop every document of `table`; unrecoverable
    fn purge_unsafe(&self, table: &str) -> SorResult<()>;
}

// ============================================================================
// DataDao
// ============================================================================

/// In-process data access object over pluggable stores
pub struct DataDao {
    store: Arc<dyn TimelineStore>,
    history: Arc<dyn HistoryStore>,
    consistency: ConsistencyTracker,
    column_batch_size: AtomicUsize,
    key_page_size: usize,
    retry: RetryPolicy,
}

impl DataDao {
    /// DAO with default configuration and the system clock
    pub fn new(store: Arc<dyn TimelineStore>, history: Arc<dyn HistoryStore>) -> Self {
        DataDao {
            store,
            history,
            consistency: ConsistencyTracker::new(),
            column_batch_size: AtomicUsize::new(DEFAULT_COLUMN_BATCH_SIZE),
            key_page_size: DEFAULT_KEY_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// DAO with explicit configuration and clock
    pub fn with_config(
        store: Arc<dyn TimelineStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        config: &DaoConfig,
    ) -> SorResult<Self> {
        config.validate()?;
        let consistency = ConsistencyTracker::with_clock(clock);
        consistency.set_full_consistency_delay(config.full_consistency_delay);
        if let Some(pinned) = config.full_consistency_timestamp {
            consistency.set_full_consistency_timestamp(pinned);
        }
        Ok(DataDao {
            store,
            history,
            consistency,
            column_batch_size: AtomicUsize::new(config.column_batch_size),
            key_page_size: config.key_page_size,
            retry: RetryPolicy {
                max_backoff: config.max_retry_backoff,
            },
        })
    }

    /// DAO reading the system clock with explicit configuration
    pub fn from_config(
        store: Arc<dyn TimelineStore>,
        history: Arc<dyn HistoryStore>,
        config: &DaoConfig,
    ) -> SorResult<Self> {
        Self::with_config(store, history, Arc::new(SystemClock), config)
    }

    /// Change how many entries later reads hold eagerly
    ///
    /// Records already handed out keep the size they were read with.
    pub fn set_column_batch_size(&self, size: usize) -> SorResult<()> {
        if size == 0 {
            return Err(SorError::invalid_input("column_batch_size must be at least 1"));
        }
        self.column_batch_size.store(size, Ordering::Relaxed);
        Ok(())
    }

    /// Entries per record currently held eagerly
    pub fn column_batch_size(&self) -> usize {
        self.column_batch_size.load(Ordering::Relaxed)
    }

    /// Set how far the full-consistency watermark trails the clock
    pub fn set_full_consistency_delay(&self, delay: Duration) {
        self.consistency.set_full_consistency_delay(delay);
    }

    /// Pin the full-consistency watermark
    pub fn set_full_consistency_timestamp(&self, timestamp: Timestamp) {
        self.consistency.set_full_consistency_timestamp(timestamp);
    }

    /// Watermark source shared with callers such as the compactor
    pub fn consistency(&self) -> &ConsistencyTracker {
        &self.consistency
    }

    pub(crate) fn record_reader(&self) -> RecordReader {
        RecordReader {
            store: Arc::clone(&self.store),
            column_batch_size: self.column_batch_size(),
            retry: self.retry,
        }
    }
}

impl std::fmt::Debug for DataDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDao")
            .field("consistency", &self.consistency)
            .field("column_batch_size", &self.column_batch_size())
            .field("key_page_size", &self.key_page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

fn validate_key(table: &str, key: &str) -> SorResult<()> {
    validate_table_name(table)?;
    validate_row_key(key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;
    use crate::timeline::InMemoryTimelineStore;

    fn dao() -> DataDao {
        DataDao::new(
            Arc::new(InMemoryTimelineStore::new()),
            Arc::new(InMemoryHistoryStore::new()),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DaoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.column_batch_size, 50);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = DaoConfig {
            column_batch_size: 0,
            ..DaoConfig::default()
        };
        assert!(config.validate().unwrap_err().is_validation());

        let dao = dao();
        assert!(dao.set_column_batch_size(0).unwrap_err().is_validation());
        assert_eq!(dao.column_batch_size(), DEFAULT_COLUMN_BATCH_SIZE);
        dao.set_column_batch_size(3).unwrap();
        assert_eq!(dao.column_batch_size(), 3);
    }

    #[test]
    fn test_config_serde_uses_millis() {
        let config = DaoConfig {
            full_consistency_delay: Duration::from_secs(2),
            ..DaoConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["full_consistency_delay"], 2_000);
        let back: DaoConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
