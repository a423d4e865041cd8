//! `DataReader` for `DataDao`

use std::ops::Bound;

use tracing::debug;

use sor_core::{
    validate_table_name, Change, ChangeId, History, Key, ReadConsistency, SorError, SorResult,
    Timestamp,
};

use super::scan::{KeyRangeScan, RecordIter};
use super::{DataDao, DataReader, TimelineQuery, LOCAL_PLACEMENT_CLUSTER};
use crate::record::Record;
use crate::scan_range::{ScanRange, ScanRangeSplits};
use crate::split::SplitRange;

const LOCAL_GROUP: &str = "local";
const LOCAL_HOST: &str = "localhost";

impl DataReader for DataDao {
    fn full_consistency_timestamp(&self, table: &str) -> Timestamp {
        self.consistency.full_consistency_timestamp(table)
    }

    fn raw_consistency_timestamp(&self, table: &str) -> Timestamp {
        self.consistency.raw_consistency_timestamp(table)
    }

    fn count(&self, table: &str, _consistency: ReadConsistency) -> SorResult<u64> {
        validate_table_name(table)?;
        self.retry.run(|| self.store.count_keys(table))
    }

    fn count_with_limit(
        &self,
        table: &str,
        limit: Option<u64>,
        consistency: ReadConsistency,
    ) -> SorResult<u64> {
        let actual = self.count(table, consistency)?;
        Ok(limit.map_or(actual, |limit| limit.min(actual)))
    }

    fn read(&self, key: &Key, _consistency: ReadConsistency) -> SorResult<Record> {
        self.record_reader().read(key.clone())
    }

    fn read_all(&self, keys: Vec<Key>, consistency: ReadConsistency) -> RecordIter<'_> {
        Box::new(keys.into_iter().map(move |key| self.read(&key, consistency)))
    }

    fn read_timeline(
        &self,
        key: &Key,
        query: &TimelineQuery,
        _consistency: ReadConsistency,
    ) -> SorResult<Vec<Change>> {
        if query.limit == 0 {
            return Err(SorError::invalid_input("timeline limit must be at least 1"));
        }
        if !query.include_content_data {
            return Ok(Vec::new());
        }
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if start > end {
                return Ok(Vec::new());
            }
        }
        let timeline = self.retry.run(|| self.store.get(key.table(), key.key()))?;
        let lower = query.start.map_or(Bound::Unbounded, Bound::Included);
        let upper = query.end.map_or(Bound::Unbounded, Bound::Included);
        let range = timeline.range::<ChangeId, _>((lower, upper));
        let changes: Vec<Change> = if query.reversed {
            range.rev().take(query.limit).map(|(_, c)| c.clone()).collect()
        } else {
            range.take(query.limit).map(|(_, c)| c.clone()).collect()
        };
        debug!(target: "sor::dao", key = %key, returned = changes.len(), "read_timeline");
        Ok(changes)
    }

    fn get_existing_histories(
        &self,
        key: &Key,
        start: Option<ChangeId>,
        end: Option<ChangeId>,
        _consistency: ReadConsistency,
    ) -> SorResult<Vec<History>> {
        let histories = self.history.get_history(key.table(), key.key())?;
        Ok(histories
            .into_iter()
            .filter(|h| start.map_or(true, |s| h.change_id >= s))
            .filter(|h| end.map_or(true, |e| h.change_id <= e))
            .collect())
    }

    fn scan(
        &self,
        table: &str,
        from_key_exclusive: Option<&str>,
        limit: Option<usize>,
        _consistency: ReadConsistency,
    ) -> SorResult<RecordIter<'_>> {
        validate_table_name(table)?;
        check_limit(limit)?;
        Ok(Box::new(KeyRangeScan::new(
            self.record_reader(),
            table,
            non_empty(from_key_exclusive),
            None,
            limit,
            self.key_page_size,
        )))
    }

    fn get_splits(
        &self,
        table: &str,
        records_per_split: usize,
        resplit_depth: u32,
    ) -> SorResult<Vec<String>> {
        validate_table_name(table)?;
        let split_size = records_per_split.checked_shr(resplit_depth).unwrap_or(0);
        if split_size == 0 {
            return Err(SorError::invalid_input(format!(
                "records_per_split {} at resplit depth {} leaves empty splits",
                records_per_split, resplit_depth
            )));
        }

        let mut splits = Vec::new();
        let mut start = String::new();
        let mut count = 0usize;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.retry.run(|| {
                self.store
                    .scan_keys(table, cursor.as_deref(), None, self.key_page_size)
            })?;
            let page_len = page.len();
            for key in page {
                count += 1;
                if count == split_size {
                    splits.push(SplitRange::new(start.clone(), Some(key.clone())).encode());
                    start = key.clone();
                    count = 0;
                }
                cursor = Some(key);
            }
            if page_len < self.key_page_size {
                break;
            }
        }
        if count > 0 {
            splits.push(SplitRange::new(start, None).encode());
        }

        debug!(
            target: "sor::dao",
            table,
            split_size,
            splits = splits.len(),
            "Computed splits"
        );
        Ok(splits)
    }

    fn get_split(
        &self,
        table: &str,
        split: &str,
        from_key_exclusive: Option<&str>,
        limit: Option<usize>,
        _consistency: ReadConsistency,
    ) -> SorResult<RecordIter<'_>> {
        validate_table_name(table)?;
        check_limit(limit)?;
        let range = SplitRange::decode(split)?;
        let lower = match non_empty(from_key_exclusive) {
            Some(resume) if resume.as_str() > range.start_exclusive() => Some(resume),
            _ => non_empty(Some(range.start_exclusive())),
        };
        Ok(Box::new(KeyRangeScan::new(
            self.record_reader(),
            table,
            lower,
            range.end_inclusive().map(str::to_string),
            limit,
            self.key_page_size,
        )))
    }

    fn get_scan_range_splits(
        &self,
        _placement: &str,
        desired_records_per_split: usize,
        subrange: Option<ScanRange>,
    ) -> SorResult<ScanRangeSplits> {
        if desired_records_per_split == 0 {
            return Err(SorError::invalid_input(
                "desired_records_per_split must be at least 1",
            ));
        }
        Ok(ScanRangeSplits::builder()
            .add_scan_range(
                LOCAL_GROUP,
                LOCAL_HOST,
                subrange.unwrap_or_else(ScanRange::all),
            )
            .build())
    }

    fn placement_cluster(&self, _placement: &str) -> String {
        LOCAL_PLACEMENT_CLUSTER.to_string()
    }
}

impl DataDao {
    /// Read a document addressed by raw identifiers
    pub fn read_row(&self, table: &str, key: &str, consistency: ReadConsistency) -> SorResult<Record> {
        self.read(&Key::new(table, key)?, consistency)
    }
}

fn check_limit(limit: Option<usize>) -> SorResult<()> {
    if limit == Some(0) {
        return Err(SorError::invalid_input("limit must be at least 1"));
    }
    Ok(())
}

fn non_empty(key: Option<&str>) -> Option<String> {
    key.filter(|k| !k.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;
    use crate::timeline::{InMemoryTimelineStore, TimelineStore};
    use sor_core::Delta;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn dao_with(rows: &[&str]) -> (DataDao, Arc<InMemoryTimelineStore>) {
        let store = Arc::new(InMemoryTimelineStore::new());
        for row in rows {
            store
                .put(
                    "t",
                    row,
                    Change::delta(ChangeId::now(), Delta::literal(serde_json::json!(row)), BTreeSet::new()),
                )
                .unwrap();
        }
        let dao = DataDao::new(store.clone(), Arc::new(InMemoryHistoryStore::new()));
        (dao, store)
    }

    fn scanned(iter: RecordIter<'_>) -> Vec<String> {
        iter.map(|r| r.unwrap().key().key().to_string()).collect()
    }

    #[test]
    fn test_count_with_limit() {
        let (dao, _) = dao_with(&["a", "b", "c"]);
        assert_eq!(dao.count("t", ReadConsistency::Strong).unwrap(), 3);
        assert_eq!(
            dao.count_with_limit("t", Some(2), ReadConsistency::Strong).unwrap(),
            2
        );
        assert_eq!(
            dao.count_with_limit("t", None, ReadConsistency::Strong).unwrap(),
            3
        );
        assert!(dao.count("", ReadConsistency::Strong).unwrap_err().is_validation());
    }

    #[test]
    fn test_scan_resumes_after_key() {
        let (dao, _) = dao_with(&["a", "b", "c"]);
        let all = dao.scan("t", None, None, ReadConsistency::Strong).unwrap();
        assert_eq!(scanned(all), vec!["a", "b", "c"]);
        let rest = dao.scan("t", Some("a"), Some(1), ReadConsistency::Strong).unwrap();
        assert_eq!(scanned(rest), vec!["b"]);
        assert!(dao.scan("t", None, Some(0), ReadConsistency::Strong).is_err());
    }

    #[test]
    fn test_splits_of_five_keys() {
        let (dao, _) = dao_with(&["a", "b", "c", "d", "e"]);
        let splits = dao.get_splits("t", 2, 0).unwrap();
        let ranges: Vec<SplitRange> = splits
            .iter()
            .map(|s| SplitRange::decode(s).unwrap())
            .collect();
        assert_eq!(
            ranges,
            vec![
                SplitRange::new("", Some("b".into())),
                SplitRange::new("b", Some("d".into())),
                SplitRange::new("d", None),
            ]
        );
    }

    #[test]
    fn test_split_size_zero_rejected() {
        let (dao, _) = dao_with(&["a"]);
        assert!(dao.get_splits("t", 0, 0).unwrap_err().is_validation());
        assert!(dao.get_splits("t", 4, 3).unwrap_err().is_validation());
        assert!(dao.get_splits("t", 4, 64).unwrap_err().is_validation());
        assert_eq!(dao.get_splits("t", 4, 2).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_table_has_no_splits() {
        let (dao, _) = dao_with(&[]);
        assert!(dao.get_splits("t", 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_get_split_resume() {
        let (dao, _) = dao_with(&["a", "b", "c", "d", "e"]);
        let token = SplitRange::new("a", Some("d".into())).encode();
        let all = dao.get_split("t", &token, None, None, ReadConsistency::Strong).unwrap();
        assert_eq!(scanned(all), vec!["b", "c", "d"]);
        let resumed = dao
            .get_split("t", &token, Some("b"), None, ReadConsistency::Strong)
            .unwrap();
        assert_eq!(scanned(resumed), vec!["c", "d"]);
        let behind = dao
            .get_split("t", &token, Some("0"), None, ReadConsistency::Strong)
            .unwrap();
        assert_eq!(scanned(behind), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_get_split_rejects_bad_token() {
        let (dao, _) = dao_with(&["a"]);
        let err = dao
            .get_split("t", "x", None, None, ReadConsistency::Strong)
            .err()
            .unwrap();
        assert!(err.is_validation());
    }

    #[test]
    fn test_scan_range_splits_single_group() {
        let (dao, _) = dao_with(&[]);
        let subrange = ScanRange::new(Some("a".into()), Some("m".into()));
        let splits = dao
            .get_scan_range_splits("ugc_us:ugc", 1_000, Some(subrange.clone()))
            .unwrap();
        assert_eq!(splits.ranges().cloned().collect::<Vec<_>>(), vec![subrange]);
        let everything = dao.get_scan_range_splits("ugc_us:ugc", 1_000, None).unwrap();
        assert_eq!(
            everything.ranges().cloned().collect::<Vec<_>>(),
            vec![ScanRange::all()]
        );
        assert_eq!(dao.placement_cluster("ugc_us:ugc"), "process");
    }

    #[test]
    fn test_read_row_validates() {
        let (dao, _) = dao_with(&["a"]);
        assert!(dao.read_row("t", "", ReadConsistency::Strong).unwrap_err().is_validation());
        let record = dao.read_row("t", "a", ReadConsistency::Strong).unwrap();
        assert_eq!(record.pass_two().count(), 1);
    }
}
