//! A document written, compacted in two rounds as the watermark advances,
//! and read back through every reader operation.

use crate::common::{key, TestDao};
use serde_json::json;
use sordb::{
    Compactor, DataReader, DataWriter, Delta, HistoryArchival, HistoryStore, ReadConsistency,
    Resolved, Timestamp, TimelineQuery,
};

fn set(field: &str, value: i64) -> Delta {
    let mut entries = serde_json::Map::new();
    entries.insert(field.to_string(), json!(value));
    Delta::map_update(entries)
}

#[test]
fn compaction_follows_the_watermark() {
    let t = TestDao::from_toml("column_batch_size = 2\nfull_consistency_timestamp_ms = 5000\n");
    let doc = key("reviews", "r1");

    t.write_at("reviews", "r1", 1_000, Delta::literal(json!({ "rating": 1 })));
    for i in 2..=8u64 {
        t.write_at("reviews", "r1", i * 1_000, set("rating", i as i64));
    }
    let resolve = || Resolved::from_record(&t.dao.read(&doc, ReadConsistency::Strong).unwrap()).unwrap();
    let expected = resolve();
    assert_eq!(expected.content, Some(json!({ "rating": 8 })));
    assert_eq!(expected.version, 8);

    // Watermark at 5s folds the first five deltas
    let report = Compactor::default().compact_key(&t.dao, &doc).unwrap().unwrap();
    assert!(report.compaction_written);
    assert_eq!(report.history, HistoryArchival::Archived(5));
    assert_eq!(resolve(), expected);
    assert_eq!(t.history.get_history("reviews", "r1").unwrap().len(), 5);

    let timeline = t
        .dao
        .read_timeline(&doc, &TimelineQuery::default(), ReadConsistency::Strong)
        .unwrap();
    assert_eq!(timeline.len(), 4);
    assert_eq!(timeline.iter().filter(|c| c.is_compaction()).count(), 1);

    // Advancing the watermark folds the rest into a single entry
    t.dao.set_full_consistency_timestamp(Timestamp::from_millis(9_000));
    Compactor::default().compact_key(&t.dao, &doc).unwrap().unwrap();
    assert_eq!(resolve(), expected);
    let record = t.dao.read(&doc, ReadConsistency::Strong).unwrap();
    assert_eq!(record.pass_two().count(), 1);
    assert_eq!(record.pass_one().count(), 1);

    // Nothing left to fold
    assert!(Compactor::default().compact_key(&t.dao, &doc).unwrap().is_none());
}

#[test]
fn default_config_never_compacts_fresh_writes() {
    let t = TestDao::new();
    let doc = key("reviews", "fresh");
    for i in 0..4 {
        t.dao
            .update(&sordb::RecordUpdate::new(
                "reviews",
                "fresh",
                sordb::ChangeId::now(),
                set("n", i),
            ))
            .unwrap();
    }
    // The default delay keeps the watermark weeks behind the clock
    assert!(Compactor::default().compact_key(&t.dao, &doc).unwrap().is_none());
    assert_eq!(
        t.dao
            .read(&doc, ReadConsistency::Strong)
            .unwrap()
            .pass_two()
            .count(),
        4
    );
}

#[test]
fn deleted_document_stays_deleted_through_compaction() {
    let t = TestDao::from_toml("full_consistency_timestamp_ms = 10000\n");
    let doc = key("reviews", "gone");
    t.write_at("reviews", "gone", 1_000, Delta::literal(json!({ "body": "hi" })));
    t.write_at("reviews", "gone", 2_000, Delta::Delete);

    Compactor::default().compact_key(&t.dao, &doc).unwrap().unwrap();
    let resolved = Resolved::from_record(&t.dao.read(&doc, ReadConsistency::Strong).unwrap()).unwrap();
    assert!(!resolved.exists());
    assert_eq!(resolved.version, 2);
    assert_eq!(t.dao.count("reviews", ReadConsistency::Strong).unwrap(), 1);

    t.dao.purge_unsafe("reviews").unwrap();
    assert_eq!(t.dao.count("reviews", ReadConsistency::Strong).unwrap(), 0);
}
