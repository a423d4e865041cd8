//! Compaction tests
//!
//! Compaction must never change what a reader resolves:
//! - Planned compactions preserve `Resolved` state
//! - Replaying a compaction after a partial failure is harmless
//! - The two-phase halves compose in either order
//! - Racing compactors on one key converge

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map};
use sor_core::{ChangeId, Delta, Key, ReadConsistency, Timestamp};
use sor_storage::{
    CompactionPlan, Compactor, DataDao, DataReader, DataWriter, HistoryArchival, HistoryStore,
    InMemoryHistoryStore, InMemoryTimelineStore, RecordUpdate, Resolved,
};

fn dao() -> (DataDao, Arc<InMemoryHistoryStore>) {
    let history = Arc::new(InMemoryHistoryStore::new());
    let dao = DataDao::new(Arc::new(InMemoryTimelineStore::new()), history.clone());
    (dao, history)
}

fn key() -> Key {
    Key::new("t", "doc").unwrap()
}

fn random_delta(rng: &mut StdRng) -> Delta {
    match rng.gen_range(0..10) {
        0 => Delta::Delete,
        1 => Delta::Noop,
        2 | 3 => Delta::literal(json!({ "v": rng.gen_range(0..100) })),
        _ => {
            let mut entries = Map::new();
            let field = format!("f{}", rng.gen_range(0..4));
            if rng.gen_bool(0.2) {
                entries.insert(field, serde_json::Value::Null);
            } else {
                entries.insert(field, json!(rng.gen_range(0..100)));
            }
            Delta::map_update(entries)
        }
    }
}

fn write_random_history(dao: &DataDao, rng: &mut StdRng, count: u64) {
    for i in 1..=count {
        let tags: BTreeSet<String> = [format!("w{}", i % 3)].into_iter().collect();
        dao.update(
            &RecordUpdate::new("t", "doc", ChangeId::from_millis(i * 1_000), random_delta(rng))
                .with_tags(tags),
        )
        .unwrap();
    }
}

fn resolve(dao: &DataDao) -> Resolved {
    Resolved::from_record(&dao.read(&key(), ReadConsistency::Strong).unwrap()).unwrap()
}

fn plan(dao: &DataDao, watermark_ms: u64) -> Option<CompactionPlan> {
    let record = dao.read(&key(), ReadConsistency::Strong).unwrap();
    Compactor::default()
        .plan(&record, Timestamp::from_millis(watermark_ms))
        .unwrap()
}

#[test]
fn test_repeated_compaction_preserves_state() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (dao, _) = dao();
        write_random_history(&dao, &mut rng, 30);
        let expected = resolve(&dao);

        let mut watermark = 0;
        while watermark < 31_000 {
            watermark += rng.gen_range(1_000..8_000);
            if let Some(plan) = plan(&dao, watermark) {
                Compactor::default().compact(&dao, &plan).unwrap();
            }
            assert_eq!(resolve(&dao), expected, "seed {} watermark {}", seed, watermark);
        }
        let record = dao.read(&key(), ReadConsistency::Strong).unwrap();
        assert_eq!(record.pass_two().count(), 1, "seed {}", seed);
    }
}

#[test]
fn test_compaction_records_last_tags() {
    let (dao, _) = dao();
    let mut rng = StdRng::seed_from_u64(7);
    write_random_history(&dao, &mut rng, 4);
    let plan = plan(&dao, 10_000).unwrap();
    let expected: BTreeSet<String> = ["w1".to_string()].into_iter().collect();
    assert_eq!(plan.request.compaction.last_tags, expected);
    assert_eq!(plan.request.compaction.count, 4);
}

#[test]
fn test_replay_after_partial_failure() {
    let (dao, history) = dao();
    let mut rng = StdRng::seed_from_u64(11);
    write_random_history(&dao, &mut rng, 6);
    let expected = resolve(&dao);
    let plan = plan(&dao, 4_000).unwrap();

    // First attempt only got as far as writing the compaction
    dao.add_compaction_only(&plan.request).unwrap();
    assert_eq!(resolve(&dao), expected);

    let report = dao.compact(&plan.request).unwrap();
    assert_eq!(report.history, HistoryArchival::Archived(4));
    assert_eq!(resolve(&dao), expected);
    assert_eq!(history.get_history("t", "doc").unwrap().len(), 4);

    dao.compact(&plan.request).unwrap();
    assert_eq!(resolve(&dao), expected);
    assert_eq!(history.get_history("t", "doc").unwrap().len(), 4);
}

#[test]
fn test_write_half_then_delete_half() {
    let (dao, _) = dao();
    let mut rng = StdRng::seed_from_u64(3);
    write_random_history(&dao, &mut rng, 5);
    let expected = resolve(&dao);
    let plan = plan(&dao, 5_000).unwrap();

    dao.add_compaction_only(&plan.request).unwrap();
    assert_eq!(resolve(&dao), expected);
    dao.delete_deltas_only(&plan.request).unwrap();
    assert_eq!(resolve(&dao), expected);
    assert_eq!(
        dao.read(&key(), ReadConsistency::Strong)
            .unwrap()
            .pass_two()
            .count(),
        1
    );
}

#[test]
fn test_racing_compactors_converge() {
    let (dao, _) = dao();
    let mut rng = StdRng::seed_from_u64(99);
    write_random_history(&dao, &mut rng, 40);
    let expected = resolve(&dao);
    let dao = Arc::new(dao);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dao = Arc::clone(&dao);
            thread::spawn(move || {
                for _ in 0..5 {
                    let record = dao.read(&key(), ReadConsistency::Strong).unwrap();
                    let plan = Compactor::default()
                        .plan(&record, Timestamp::from_millis(u64::MAX))
                        .unwrap();
                    if let Some(plan) = plan {
                        Compactor::default().compact(dao.as_ref(), &plan).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(resolve(&dao), expected);
    if let Some(plan) = plan(&dao, u64::MAX) {
        Compactor::default().compact(dao.as_ref(), &plan).unwrap();
    }
    assert_eq!(resolve(&dao), expected);
}
