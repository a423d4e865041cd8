//! Fixed-rate background tasks
//!
//! A `FixedRateRunner` owns one named thread that runs a task at
//! `initial_delay`, then every `period`. Runs are scheduled against the
//! original start, so a slow run does not push later runs back; a run that
//! falls behind starts immediately.
//!
//! The runner sleeps in short slices and checks two conditions between
//! slices and before every run:
//! - the shutdown flag set by `stop()`
//! - a caller-supplied keep-running guard (e.g. "lease still held")
//!
//! Either one ends the thread without running the task again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use sor_core::{SorError, SorResult};

/// Longest single sleep between checks of the stop conditions
pub(crate) const POLL_SLICE: Duration = Duration::from_millis(100);

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// When a fixed-rate task first runs and how often it repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRateSchedule {
    /// Delay before the first run
    pub initial_delay: Duration,
    /// Interval between run starts
    pub period: Duration,
}

impl FixedRateSchedule {
    /// Schedule with an explicit first delay
    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }

    /// Daily schedule whose first run is the next UTC midnight after `now`
    pub fn daily_from(now: DateTime<Utc>) -> Self {
        Self::from_next_midnight(now, ONE_DAY)
    }

    /// First run at the next UTC midnight strictly after `now`, then every
    /// `period`
    pub fn from_next_midnight(now: DateTime<Utc>, period: Duration) -> Self {
        let initial_delay = now
            .date_naive()
            .succ_opt()
            .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
            .and_then(|midnight| (Utc.from_utc_datetime(&midnight) - now).to_std().ok())
            .unwrap_or(period);
        Self::new(initial_delay, period)
    }
}

/// Sleep in slices until `deadline` passes or `stop` returns true
///
/// A `None` deadline never passes. Returns true when the deadline was
/// reached, false when stopped.
pub(crate) fn wait_until(deadline: Option<Instant>, stop: impl Fn() -> bool) -> bool {
    loop {
        if stop() {
            return false;
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return true,
            Some(deadline) => deadline - now,
            None => POLL_SLICE,
        };
        thread::sleep(remaining.min(POLL_SLICE));
    }
}

/// Background thread running a task on a `FixedRateSchedule`
pub struct FixedRateRunner {
    name: String,
    shutdown: Arc<AtomicBool>,
    runs: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FixedRateRunner {
    /// Spawn the runner thread
    ///
    /// `keep_running` is consulted before every run and between sleep
    /// slices; once it returns false the thread exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start<G, F>(
        name: impl Into<String>,
        schedule: FixedRateSchedule,
        keep_running: G,
        mut task: F,
    ) -> SorResult<Self>
    where
        G: Fn() -> bool + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicU64::new(0));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_runs = Arc::clone(&runs);
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let stop = || thread_shutdown.load(Ordering::Relaxed) || !keep_running();
                let mut next_run = Instant::now().checked_add(schedule.initial_delay);
                debug!(
                    target: "sor::schedule",
                    name = %thread_name,
                    initial_delay_ms = schedule.initial_delay.as_millis() as u64,
                    period_ms = schedule.period.as_millis() as u64,
                    "Runner started"
                );
                while wait_until(next_run, stop) {
                    task();
                    thread_runs.fetch_add(1, Ordering::Relaxed);
                    next_run = next_run.and_then(|at| at.checked_add(schedule.period));
                }
                debug!(target: "sor::schedule", name = %thread_name, "Runner stopped");
            })
            .map_err(|e| {
                SorError::internal(format!("Failed to spawn runner thread '{}': {}", name, e))
            })?;

        Ok(Self {
            name,
            shutdown,
            runs,
            handle: Some(handle),
        })
    }

    /// Number of completed task runs
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// True while the runner thread is alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Signal the thread to exit and wait for it
    ///
    /// A run in progress completes first. Calling `stop` twice is harmless.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "sor::schedule", name = %self.name, "Runner thread panicked");
            }
        }
    }
}

impl Drop for FixedRateRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
