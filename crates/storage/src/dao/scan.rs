//! Lazy, paged key-range scans

use std::collections::VecDeque;

use sor_core::{Key, SorResult};

use crate::record::{Record, RecordReader};

/// Lazily produced records; backend failures surface per item
pub type RecordIter<'a> = Box<dyn Iterator<Item = SorResult<Record>> + Send + 'a>;

/// Reads documents in `(cursor, end_inclusive]` one key page at a time
///
/// The key set is not a snapshot: each page reflects the store when it is
/// fetched. The cursor only moves forward, so no key is produced twice.
pub(crate) struct KeyRangeScan {
    reader: RecordReader,
    table: String,
    cursor: Option<String>,
    end_inclusive: Option<String>,
    remaining: Option<usize>,
    page_size: usize,
    page: VecDeque<String>,
    exhausted: bool,
}

impl KeyRangeScan {
    pub(crate) fn new(
        reader: RecordReader,
        table: &str,
        from_exclusive: Option<String>,
        end_inclusive: Option<String>,
        limit: Option<usize>,
        page_size: usize,
    ) -> Self {
        KeyRangeScan {
            reader,
            table: table.to_string(),
            cursor: from_exclusive,
            end_inclusive,
            remaining: limit,
            page_size: page_size.max(1),
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill_page(&mut self) -> SorResult<()> {
        let fetch = match self.remaining {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };
        let store = &self.reader.store;
        let keys = self.reader.retry.run(|| {
            store.scan_keys(
                &self.table,
                self.cursor.as_deref(),
                self.end_inclusive.as_deref(),
                fetch,
            )
        })?;
        if keys.len() < fetch {
            self.exhausted = true;
        }
        self.page.extend(keys);
        Ok(())
    }
}

impl Iterator for KeyRangeScan {
    type Item = SorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            if self.page.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(e) = self.fill_page() {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
            let row = self.page.pop_front()?;
            self.cursor = Some(row.clone());
            let record = match Key::new(self.table.clone(), row) {
                Ok(key) => self.reader.read(key),
                Err(e) => Err(e.into()),
            };
            // Rows deleted after their page was fetched are skipped
            if matches!(&record, Ok(r) if r.is_empty()) {
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(record);
        }
    }
}
