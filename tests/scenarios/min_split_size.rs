//! Temporary per-table split-size overrides in the shared map, consulted by
//! split planning and expired by the leader-elected janitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;

use crate::common::{init_tracing, TestDao};
use sordb::{
    CleanupOutcome, Clock, DataReader, ExpirationCleanup, ExpirationMonitor, InMemoryCoordinator,
    InMemoryMapStore, LeaderElection, LeaderState, ManualClock, MapStore, MinSplitSize,
    SorConfig, CONFIG_FILE_NAME,
};

const DEFAULT_RECORDS_PER_SPLIT: usize = 10;

/// Split size for `table`: an unexpired override wins over the default.
fn records_per_split(map: &dyn MapStore<MinSplitSize>, clock: &dyn Clock, table: &str) -> usize {
    match map.get(table).unwrap() {
        Some(entry) if entry.expiration_time >= clock.now() => {
            entry.min_split_size.max(DEFAULT_RECORDS_PER_SPLIT)
        }
        _ => DEFAULT_RECORDS_PER_SPLIT,
    }
}

#[test]
fn override_applies_until_the_janitor_removes_it() {
    let t = TestDao::new();
    t.populate("reviews", (0..100).map(|i| format!("r{:03}", i)));

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 23, 0, 0).unwrap());
    let map: Arc<InMemoryMapStore<MinSplitSize>> = Arc::new(InMemoryMapStore::new());
    map.set(
        "reviews",
        MinSplitSize::new(50, clock.now() + ChronoDuration::minutes(30)),
    )
    .unwrap();

    let size = records_per_split(map.as_ref(), &clock, "reviews");
    assert_eq!(t.dao.get_splits("reviews", size, 0).unwrap().len(), 2);

    let cleanup = ExpirationCleanup::new(
        map.clone() as Arc<dyn MapStore<MinSplitSize>>,
        Arc::new(clock.clone()),
    );
    assert_eq!(
        cleanup.run_one_iteration(),
        CleanupOutcome::Completed {
            examined: 1,
            removed: 0
        }
    );

    clock.advance(ChronoDuration::hours(1));
    assert_eq!(
        cleanup.run_one_iteration(),
        CleanupOutcome::Completed {
            examined: 1,
            removed: 1
        }
    );
    let size = records_per_split(map.as_ref(), &clock, "reviews");
    assert_eq!(t.dao.get_splits("reviews", size, 0).unwrap().len(), 10);
}

#[test]
fn monitor_wired_from_config_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    SorConfig::write_default_if_missing(&path).unwrap();
    let mut config = SorConfig::from_file(&path).unwrap();
    config.expiration.reacquire_delay_secs = 5;
    config.write_to_file(&path).unwrap();
    let config = SorConfig::from_file(&path).unwrap();

    let coordinator = Arc::new(InMemoryCoordinator::new());
    let map: Arc<InMemoryMapStore<MinSplitSize>> = Arc::new(InMemoryMapStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let monitors: Vec<ExpirationMonitor<MinSplitSize>> = ["host-a:8080", "host-b:8080"]
        .iter()
        .map(|identity| {
            ExpirationMonitor::new(
                &config.expiration,
                coordinator.clone() as Arc<dyn LeaderElection>,
                map.clone() as Arc<dyn MapStore<MinSplitSize>>,
                clock.clone() as Arc<dyn Clock>,
                *identity,
            )
        })
        .collect();
    for monitor in &monitors {
        monitor.start().unwrap();
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while monitors
        .iter()
        .filter(|m| m.state() == LeaderState::Leader)
        .count()
        != 1
    {
        assert!(std::time::Instant::now() < deadline, "no leader elected");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(coordinator.holder(&config.expiration.lock_path).is_some());

    for monitor in &monitors {
        monitor.shutdown();
        assert_eq!(monitor.state(), LeaderState::Stopped);
    }
    assert_eq!(coordinator.holder(&config.expiration.lock_path), None);
}
