//! Expiration Monitor
//!
//! Table configuration writes time-limited entries (such as a minimum split
//! size) into a shared map. One monitor across the fleet, chosen by leader
//! election, deletes entries whose expiration instant has passed. Cleanup
//! runs at the next UTC midnight and every period after that.
//!
//! A cycle that hits an error is logged and abandoned. The next cycle
//! retries naturally, so a failure never stops the monitor.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sor_core::{Clock, SorResult};

use crate::config::ExpirationConfig;
use crate::coordination::{LeaderElection, MapStore};
use crate::leader::{LeaderOptions, LeaderService, LeaderState, ScheduleFactory};
use crate::schedule::FixedRateSchedule;

/// Entry carrying an absolute expiration instant
pub trait Expiring {
    /// Instant after which the entry is stale
    fn expiration_time(&self) -> DateTime<Utc>;
}

/// Temporary lower bound on split size for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinSplitSize {
    /// Records per split
    pub min_split_size: usize,
    /// When the override stops applying
    pub expiration_time: DateTime<Utc>,
}

impl MinSplitSize {
    /// Create an entry
    pub fn new(min_split_size: usize, expiration_time: DateTime<Utc>) -> Self {
        Self {
            min_split_size,
            expiration_time,
        }
    }
}

impl Expiring for MinSplitSize {
    fn expiration_time(&self) -> DateTime<Utc> {
        self.expiration_time
    }
}

/// Result of one cleanup cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Every entry was examined
    Completed {
        /// Entries seen
        examined: usize,
        /// Entries deleted as expired
        removed: usize,
    },
    /// A map error cut the cycle short; remaining entries wait for the next one
    Abandoned,
}

/// One pass over the shared map
pub struct ExpirationCleanup<V> {
    map: Arc<dyn MapStore<V>>,
    clock: Arc<dyn Clock>,
}

impl<V: Expiring> ExpirationCleanup<V> {
    /// Create a cleanup over `map`, reading time from `clock`
    pub fn new(map: Arc<dyn MapStore<V>>, clock: Arc<dyn Clock>) -> Self {
        Self { map, clock }
    }

    /// Delete every entry whose expiration is strictly before now
    ///
    /// Never fails: errors abandon the cycle and are logged.
    pub fn run_one_iteration(&self) -> CleanupOutcome {
        match self.remove_expired() {
            Ok((examined, removed)) => {
                info!(target: "sor::expiration", examined, removed, "Expiration cycle complete");
                CleanupOutcome::Completed { examined, removed }
            }
            Err(e) => {
                warn!(
                    target: "sor::expiration",
                    error = %e,
                    "Failed to cleanup expired entries, abandoning cycle"
                );
                CleanupOutcome::Abandoned
            }
        }
    }

    fn remove_expired(&self) -> SorResult<(usize, usize)> {
        let entries = self.map.get_all()?;
        let mut removed = 0;
        for (key, entry) in &entries {
            let expires_at = entry.expiration_time();
            if expires_at < self.clock.now() {
                self.map.remove(key)?;
                debug!(target: "sor::expiration", key = %key, %expires_at, "Removed expired entry");
                removed += 1;
            }
        }
        Ok((entries.len(), removed))
    }
}

impl<V> fmt::Debug for ExpirationCleanup<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationCleanup").finish_non_exhaustive()
    }
}

/// Leader-elected cleanup of an expiring-entry map
pub struct ExpirationMonitor<V> {
    cleanup: Arc<ExpirationCleanup<V>>,
    last_outcome: Arc<Mutex<Option<CleanupOutcome>>>,
    service: LeaderService,
}

impl<V: Expiring + 'static> ExpirationMonitor<V> {
    /// Wire a monitor from configuration
    ///
    /// Each leadership term schedules its first cycle at the UTC midnight
    /// following the moment leadership was gained.
    pub fn new(
        config: &ExpirationConfig,
        election: Arc<dyn LeaderElection>,
        map: Arc<dyn MapStore<V>>,
        clock: Arc<dyn Clock>,
        identity: impl Into<String>,
    ) -> Self {
        let options = LeaderOptions {
            lock_path: config.lock_path.clone(),
            identity: identity.into(),
            service_name: config.service_name.clone(),
            reacquire_delay: config.reacquire_delay(),
        };
        let period = config.period();
        let schedule_clock = Arc::clone(&clock);
        let schedule: ScheduleFactory =
            Box::new(move || FixedRateSchedule::from_next_midnight(schedule_clock.now(), period));
        Self::with_schedule(options, election, map, clock, schedule)
    }

    /// Wire a monitor with an explicit schedule
    pub fn with_schedule(
        options: LeaderOptions,
        election: Arc<dyn LeaderElection>,
        map: Arc<dyn MapStore<V>>,
        clock: Arc<dyn Clock>,
        schedule: ScheduleFactory,
    ) -> Self {
        let cleanup = Arc::new(ExpirationCleanup::new(map, clock));
        let last_outcome = Arc::new(Mutex::new(None));

        let task_cleanup = Arc::clone(&cleanup);
        let task_outcome = Arc::clone(&last_outcome);
        let service = LeaderService::new(
            election,
            options,
            schedule,
            Arc::new(move || {
                let outcome = task_cleanup.run_one_iteration();
                *task_outcome.lock() = Some(outcome);
            }),
        );

        Self {
            cleanup,
            last_outcome,
            service,
        }
    }

    /// Begin contending for leadership
    pub fn start(&self) -> SorResult<()> {
        self.service.start()
    }

    /// Stop contending; a held lease is released
    pub fn shutdown(&self) {
        self.service.shutdown()
    }

    /// Current leadership state
    pub fn state(&self) -> LeaderState {
        self.service.state()
    }

    /// Outcome of the most recent cycle run by this process
    pub fn last_outcome(&self) -> Option<CleanupOutcome> {
        *self.last_outcome.lock()
    }

    /// The cleanup pass, for running a cycle by hand
    pub fn cleanup(&self) -> &ExpirationCleanup<V> {
        &self.cleanup
    }
}

impl<V> fmt::Debug for ExpirationMonitor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationMonitor")
            .field("service", &self.service)
            .finish()
    }
}
