//! Consistency watermarks
//!
//! - **full consistency timestamp**: every replica is guaranteed to have
//!   converged on all changes created at or before it. Readers that need
//!   authoritative data trust only changes whose derived timestamp is
//!   `<=` this watermark.
//! - **raw consistency timestamp**: best effort, may race writers. A single
//!   replica backend reports the same value as the full watermark.
//!
//! Both are pure functions of the clock and configuration. A pinned value,
//! when set, overrides the clock for deterministic tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use sor_core::{ChangeId, Clock, SystemClock, Timestamp};

/// Default full-consistency delay: `i32::MAX` milliseconds (about 24.8
/// days), so nothing counts as fully consistent until a real delay is
/// configured.
pub const DEFAULT_FULL_CONSISTENCY_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

#[derive(Debug, Clone, Copy)]
struct Settings {
    delay: Duration,
    pinned: Option<Timestamp>,
}

/// Computes per-table consistency watermarks
#[derive(Clone)]
pub struct ConsistencyTracker {
    clock: Arc<dyn Clock>,
    settings: Arc<RwLock<Settings>>,
}

impl ConsistencyTracker {
    /// Tracker reading the system clock with the default delay
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Tracker reading an injected clock with the default delay
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        ConsistencyTracker {
            clock,
            settings: Arc::new(RwLock::new(Settings {
                delay: DEFAULT_FULL_CONSISTENCY_DELAY,
                pinned: None,
            })),
        }
    }

    /// Set how far behind "now" the full-consistency watermark trails
    ///
    /// Clears any pinned watermark.
    pub fn set_full_consistency_delay(&self, delay: Duration) {
        let mut settings = self.settings.write();
        settings.delay = delay;
        settings.pinned = None;
    }

    /// Pin the full-consistency watermark to a fixed value
    pub fn set_full_consistency_timestamp(&self, timestamp: Timestamp) {
        self.settings.write().pinned = Some(timestamp);
    }

    /// Current full-consistency delay
    pub fn full_consistency_delay(&self) -> Duration {
        self.settings.read().delay
    }

    /// Watermark at or before which every replica has converged
    ///
    /// Every table shares one delay in this implementation; the parameter
    /// keeps the per-table contract.
    pub fn full_consistency_timestamp(&self, _table: &str) -> Timestamp {
        let settings = *self.settings.read();
        match settings.pinned {
            Some(pinned) => pinned,
            None => self.clock.timestamp().saturating_sub(settings.delay),
        }
    }

    /// Best-effort watermark; equal to the full watermark here
    pub fn raw_consistency_timestamp(&self, table: &str) -> Timestamp {
        self.full_consistency_timestamp(table)
    }

    /// True if `change_id` was created at or before the full watermark
    pub fn is_fully_consistent(&self, table: &str, change_id: ChangeId) -> bool {
        change_id.timestamp() <= self.full_consistency_timestamp(table)
    }
}

impl Default for ConsistencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsistencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = *self.settings.read();
        f.debug_struct("ConsistencyTracker")
            .field("delay", &settings.delay)
            .field("pinned", &settings.pinned)
            .finish()
    }
}
