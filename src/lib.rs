//! sordb - System-of-record storage core
//!
//! Documents are per-key timelines of deltas, periodically compacted, read
//! under tunable consistency and scanned in parallel splits.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sordb::{ChangeId, DataDao, DataReader, DataWriter, Delta, InMemoryHistoryStore,
//!             InMemoryTimelineStore, Key, ReadConsistency, RecordUpdate, Resolved};
//!
//! let dao = DataDao::new(Arc::new(InMemoryTimelineStore::new()), Arc::new(InMemoryHistoryStore::new()));
//! dao.update(&RecordUpdate::new("reviews", "r1", ChangeId::now(), Delta::literal(serde_json::json!({"rating": 5}))))?;
//!
//! let record = dao.read(&Key::new("reviews", "r1")?, ReadConsistency::Strong)?;
//! let state = Resolved::from_record(&record)?;
//! ```
//!
//! # Architecture
//!
//! - `sor-core`: data model and error type
//! - `sor-storage`: timeline store, record resolution, DAO, compaction, splits
//! - `sor-engine`: coordination, leader election, expiration monitor, config

pub use sor_core::{
    validate_row_key, validate_table_name, Change, ChangeBody, ChangeId, Clock, Compaction, Delta,
    DeltaClusteringKey, History, Key, KeyError, ManualClock, ReadConsistency, SorError, SorResult,
    SystemClock, Timestamp, WriteConsistency,
};
pub use sor_engine::{
    CleanupOutcome, ExpirationCleanup, ExpirationConfig, ExpirationMonitor, Expiring,
    FixedRateRunner, FixedRateSchedule, InMemoryCoordinator, InMemoryMapStore, LeaderElection,
    LeaderOptions, LeaderService, LeaderState, LeaderTask, LeadershipLease, MapStore,
    MinSplitSize, ScheduleFactory, SorConfig, CONFIG_FILE_NAME,
};
pub use sor_storage::{
    CompactionPlan, CompactionReport, CompactionRequest, Compactor, ConsistencyTracker, DaoConfig,
    DataDao, DataReader, DataWriter, HistoryArchival, HistoryStore, HostRanges,
    InMemoryHistoryStore, InMemoryTimelineStore, NoopUpdateListener, Record,
    RecordEntryRawMetadata, RecordIter, RecordUpdate, Resolved, RetryPolicy, ScanRange,
    ScanRangeSplits, ScanRangeSplitsBuilder, SplitGroup, SplitRange, Timeline, TimelineQuery,
    TimelineStore, UpdateListener, DEFAULT_COLUMN_BATCH_SIZE, LOCAL_PLACEMENT_CLUSTER,
};
