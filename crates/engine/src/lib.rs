//! Fleet-level services for the system of record
//!
//! This crate holds what runs beside the storage layer:
//! - Coordination: shared map and leader election contracts + in-memory backend
//! - Schedule: fixed-rate background runner
//! - Leader: leader-elected singleton service built from the two above
//! - Expiration: leader-elected cleanup of expiring map entries
//! - Config: `sor.toml` loading
//!
//! Only the expiration monitor needs fleet-wide mutual exclusion; storage
//! operations stay lock-free and idempotent.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordination;
pub mod expiration;
pub mod leader;
pub mod schedule;

pub use config::{ExpirationConfig, SorConfig, CONFIG_FILE_NAME};
pub use coordination::{
    InMemoryCoordinator, InMemoryMapStore, LeaderElection, LeadershipLease, MapStore,
};
pub use expiration::{CleanupOutcome, ExpirationCleanup, ExpirationMonitor, Expiring, MinSplitSize};
pub use leader::{LeaderOptions, LeaderService, LeaderState, LeaderTask, ScheduleFactory};
pub use schedule::{FixedRateRunner, FixedRateSchedule};
