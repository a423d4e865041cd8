//! Bulk export: one worker per split token, no coordination between them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use crate::common::TestDao;
use sordb::{DataReader, ReadConsistency, ScanRange, SorResult, SplitRange, LOCAL_PLACEMENT_CLUSTER};

fn keys_of(iter: impl Iterator<Item = SorResult<sordb::Record>>) -> Vec<String> {
    iter.map(|r| r.map(|record| record.key().key().to_string()))
        .collect::<SorResult<_>>()
        .unwrap()
}

#[test]
fn workers_cover_the_table_exactly_once() {
    let t = TestDao::from_toml("column_batch_size = 3\n");
    t.populate("products", (0..137).map(|i| format!("p{:05}", i)));

    let splits = t.dao.get_splits("products", 20, 0).unwrap();
    assert_eq!(splits.len(), 7);

    let handles: Vec<_> = splits
        .into_iter()
        .map(|split| {
            let dao = Arc::clone(&t.dao);
            thread::spawn(move || {
                let records = dao
                    .get_split("products", &split, None, None, ReadConsistency::Strong)
                    .unwrap();
                keys_of(records)
            })
        })
        .collect();

    let mut seen = BTreeSet::new();
    let mut total = 0;
    for handle in handles {
        let keys = handle.join().unwrap();
        assert!(keys.len() <= 20);
        total += keys.len();
        seen.extend(keys);
    }
    assert_eq!(total, 137);
    assert_eq!(seen.len(), 137);

    let scanned = keys_of(
        t.dao
            .scan("products", None, None, ReadConsistency::Strong)
            .unwrap(),
    );
    assert_eq!(scanned, seen.into_iter().collect::<Vec<_>>());
}

#[test]
fn worker_resumes_inside_its_split() {
    let t = TestDao::new();
    t.populate("products", (0..10).map(|i| format!("p{}", i)));

    let splits = t.dao.get_splits("products", 4, 1).unwrap();
    assert_eq!(splits.len(), 5);

    let first = SplitRange::decode(&splits[0]).unwrap();
    assert_eq!(first.start_exclusive(), "");
    let all = keys_of(
        t.dao
            .get_split("products", &splits[0], None, None, ReadConsistency::Strong)
            .unwrap(),
    );
    assert_eq!(all, vec!["p0", "p1"]);

    let resumed = keys_of(
        t.dao
            .get_split("products", &splits[0], Some("p0"), None, ReadConsistency::Strong)
            .unwrap(),
    );
    assert_eq!(resumed, vec!["p1"]);
}

#[test]
fn single_process_placement() {
    let t = TestDao::new();
    assert_eq!(t.dao.placement_cluster("ugc_global:ugc"), LOCAL_PLACEMENT_CLUSTER);

    let splits = t
        .dao
        .get_scan_range_splits("ugc_global:ugc", 1_000, Some(ScanRange::all()))
        .unwrap();
    assert_eq!(splits.ranges().count(), 1);
    assert!(t
        .dao
        .get_scan_range_splits("ugc_global:ugc", 0, None)
        .unwrap_err()
        .is_validation());
}
