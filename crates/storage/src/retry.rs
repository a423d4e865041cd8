//! Retry of transient backend read failures
//!
//! A backend reports `ConcurrentModification` when a writer races a timeline
//! copy. Reads retry until the copy succeeds, sleeping a uniformly random
//! interval in `[0, max_backoff]` between attempts so readers racing the same
//! hot key spread out. Any other error is returned on the first attempt.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use sor_core::SorResult;

/// Default upper bound on one backoff sleep
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Backoff policy for transient read failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on one backoff sleep
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or fails with a non-transient error
    pub fn run<T>(&self, mut op: impl FnMut() -> SorResult<T>) -> SorResult<T> {
        let mut attempts: u64 = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    let pause = self.backoff();
                    debug!(
                        target: "sor::record",
                        error = %e,
                        attempts,
                        pause_ms = pause.as_millis() as u64,
                        "Retrying read after concurrent modification"
                    );
                    thread::sleep(pause);
                }
                other => return other,
            }
        }
    }

    fn backoff(&self) -> Duration {
        let max = self.max_backoff.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}
