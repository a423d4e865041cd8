//! Leader-elected singleton service
//!
//! `LeaderService` keeps one candidate thread per process contending for a
//! lock path. Whoever holds the lease runs a fixed-rate task; everyone else
//! waits and retries every `reacquire_delay`.
//!
//! ```text
//!   Candidate ──acquire──> Leader ──lease lost──> Candidate
//!       │                    │
//!       └──── shutdown ──────┴──> Stopped
//! ```
//!
//! Election and scheduling stay separate: the runner only sees a
//! keep-running guard backed by the lease, never the election backend.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use sor_core::{SorError, SorResult};

use crate::coordination::{LeaderElection, LeadershipLease};
use crate::schedule::{wait_until, FixedRateRunner, FixedRateSchedule, POLL_SLICE};

const MIN_PAUSE: Duration = Duration::from_millis(1);

/// Builds the schedule for a fresh leadership term
pub type ScheduleFactory = Box<dyn Fn() -> FixedRateSchedule + Send + Sync>;

/// Task run while leading
pub type LeaderTask = Arc<dyn Fn() + Send + Sync>;

/// Where a `LeaderService` is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    /// Contending for the lease, doing no work
    Candidate,
    /// Holding the lease and running the task
    Leader,
    /// Not started, or shut down
    Stopped,
}

/// Identity and timing of one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderOptions {
    /// Coordination path every participant contends for
    pub lock_path: String,
    /// This participant's identity, unique across the fleet
    pub identity: String,
    /// Name of the candidate and runner threads
    pub service_name: String,
    /// Wait between attempts to acquire the lease
    pub reacquire_delay: Duration,
}

struct Inner {
    election: Arc<dyn LeaderElection>,
    options: LeaderOptions,
    schedule: ScheduleFactory,
    task: LeaderTask,
    state: Mutex<LeaderState>,
    shutdown: AtomicBool,
}

impl Inner {
    fn set_state(&self, state: LeaderState) {
        *self.state.lock() = state;
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn pause(&self) {
        let delay = self.options.reacquire_delay.max(MIN_PAUSE);
        let deadline = Instant::now().checked_add(delay);
        wait_until(deadline, || self.is_shutdown());
    }

    fn run_candidate(&self) {
        let LeaderOptions {
            lock_path,
            identity,
            service_name,
            ..
        } = &self.options;

        while !self.is_shutdown() {
            self.set_state(LeaderState::Candidate);
            match self.election.try_acquire(lock_path, identity) {
                Ok(Some(lease)) => {
                    self.lead(lease);
                    self.set_state(LeaderState::Candidate);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        target: "sor::leader",
                        service = %service_name,
                        lock_path = %lock_path,
                        error = %e,
                        "Leader election failed"
                    );
                }
            }
            self.pause();
        }
        self.set_state(LeaderState::Stopped);
    }

    fn lead(&self, lease: LeadershipLease) {
        let options = &self.options;
        info!(
            target: "sor::leader",
            service = %options.service_name,
            identity = %options.identity,
            lock_path = %options.lock_path,
            "Leadership acquired"
        );
        self.set_state(LeaderState::Leader);

        let guard = lease.clone();
        let task = Arc::clone(&self.task);
        match FixedRateRunner::start(
            options.service_name.clone(),
            (self.schedule)(),
            move || guard.is_held(),
            move || task(),
        ) {
            Ok(mut runner) => {
                while !self.is_shutdown() && lease.is_held() && runner.is_running() {
                    thread::sleep(POLL_SLICE);
                }
                runner.stop();
            }
            Err(e) => {
                warn!(
                    target: "sor::leader",
                    service = %options.service_name,
                    error = %e,
                    "Failed to start leader task"
                );
            }
        }

        let lost = !lease.is_held();
        if let Err(e) = self.election.release(&lease) {
            warn!(
                target: "sor::leader",
                service = %options.service_name,
                error = %e,
                "Failed to release leadership"
            );
        }
        if lost {
            info!(
                target: "sor::leader",
                service = %options.service_name,
                identity = %options.identity,
                "Leadership lost"
            );
        } else {
            info!(
                target: "sor::leader",
                service = %options.service_name,
                identity = %options.identity,
                "Leadership released"
            );
        }
    }
}

/// Runs a task on exactly one participant across a fleet
pub struct LeaderService {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl LeaderService {
    /// Create a stopped service; call `start` to begin contending
    pub fn new(
        election: Arc<dyn LeaderElection>,
        options: LeaderOptions,
        schedule: ScheduleFactory,
        task: LeaderTask,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                election,
                options,
                schedule,
                task,
                state: Mutex::new(LeaderState::Stopped),
                shutdown: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the candidate thread
    ///
    /// # Errors
    ///
    /// A service starts at most once; starting again is a validation error.
    /// If the thread cannot be spawned the service stays stopped and may be
    /// started again.
    pub fn start(&self) -> SorResult<()> {
        let name = format!("{}-candidate", self.inner.options.service_name);
        self.start_with(thread::Builder::new().name(name))
    }

    fn start_with(&self, builder: thread::Builder) -> SorResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SorError::invalid_input(format!(
                "service '{}' was already started",
                self.inner.options.service_name
            )));
        }
        self.inner.set_state(LeaderState::Candidate);

        let inner = Arc::clone(&self.inner);
        match builder.spawn(move || inner.run_candidate()) {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(LeaderState::Stopped);
                self.started.store(false, Ordering::SeqCst);
                Err(SorError::internal(format!(
                    "Failed to spawn candidate thread for '{}': {}",
                    self.inner.options.service_name, e
                )))
            }
        }
    }

    /// Stop leading or contending and wait for the threads to exit
    ///
    /// A run in progress completes; a held lease is released.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(
                    target: "sor::leader",
                    service = %self.inner.options.service_name,
                    "Candidate thread panicked"
                );
            }
        }
        self.inner.set_state(LeaderState::Stopped);
    }

    /// Current lifecycle state
    pub fn state(&self) -> LeaderState {
        *self.inner.state.lock()
    }

    /// True while this participant holds the lease
    pub fn is_leader(&self) -> bool {
        self.state() == LeaderState::Leader
    }

    /// Participant options
    pub fn options(&self) -> &LeaderOptions {
        &self.inner.options
    }
}

impl fmt::Debug for LeaderService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderService")
            .field("options", &self.inner.options)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for LeaderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
