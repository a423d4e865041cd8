//! `DataWriter` for `DataDao`

use tracing::{debug, info, warn};

use sor_core::{validate_table_name, Change, History, Key, SorResult, WriteConsistency};

use super::compaction::{CompactionReport, CompactionRequest, HistoryArchival};
use super::{validate_key, DataDao, DataWriter};
use crate::update::{RecordUpdate, UpdateListener};

impl DataDao {
    fn archive(&self, table: &str, key: &str, history: &[History]) -> HistoryArchival {
        if history.is_empty() {
            return HistoryArchival::Skipped;
        }
        match self.history.append_history(table, key, history) {
            Ok(()) => HistoryArchival::Archived(history.len()),
            Err(e) => {
                warn!(
                    target: "sor::history",
                    table,
                    key,
                    entries = history.len(),
                    error = %e,
                    "Failed to archive compacted delta history"
                );
                HistoryArchival::Failed(e.to_string())
            }
        }
    }

    fn compaction_change(request: &CompactionRequest) -> Change {
        Change::compaction(request.compaction_id, request.compaction.clone())
    }
}

impl DataWriter for DataDao {
    fn update(&self, update: &RecordUpdate) -> SorResult<()> {
        validate_key(&update.table, &update.key)?;
        let change = Change::delta(update.change_id, update.delta.clone(), update.tags.clone());
        self.store.put(&update.table, &update.key, change)?;
        debug!(
            target: "sor::dao",
            table = %update.table,
            key = %update.key,
            change_id = %update.change_id,
            consistency = %update.consistency,
            "Appended delta"
        );
        Ok(())
    }

    fn update_all(
        &self,
        updates: &mut dyn Iterator<Item = RecordUpdate>,
        listener: &mut dyn UpdateListener,
    ) -> SorResult<()> {
        for update in updates {
            let batch = std::slice::from_ref(&update);
            listener.before_write(batch);
            self.update(&update)?;
            listener.after_write(batch);
        }
        Ok(())
    }

    fn compact(&self, request: &CompactionRequest) -> SorResult<CompactionReport> {
        request.validate()?;
        let deletes = request.delete_ids();
        self.store.apply_batch(
            &request.table,
            &request.key,
            Some(Self::compaction_change(request)),
            &deletes,
        )?;
        let history = self.archive(&request.table, &request.key, &request.history);
        info!(
            target: "sor::compaction",
            table = %request.table,
            key = %request.key,
            compaction_id = %request.compaction_id,
            cutoff = %request.compaction.cutoff,
            deleted = deletes.len(),
            history = %history,
            "Compacted timeline"
        );
        Ok(CompactionReport {
            deleted: deletes.len(),
            compaction_written: true,
            history,
        })
    }

    fn delete_deltas_only(&self, request: &CompactionRequest) -> SorResult<CompactionReport> {
        request.validate()?;
        let deletes = request.delete_ids();
        self.store
            .apply_batch(&request.table, &request.key, None, &deletes)?;
        debug!(
            target: "sor::compaction",
            table = %request.table,
            key = %request.key,
            compaction_id = %request.compaction_id,
            deleted = deletes.len(),
            "Deleted compacted entries"
        );
        Ok(CompactionReport {
            deleted: deletes.len(),
            compaction_written: false,
            history: HistoryArchival::Skipped,
        })
    }

    fn add_compaction_only(&self, request: &CompactionRequest) -> SorResult<CompactionReport> {
        request.validate()?;
        self.store.put(
            &request.table,
            &request.key,
            Self::compaction_change(request),
        )?;
        let history = self.archive(&request.table, &request.key, &request.history);
        debug!(
            target: "sor::compaction",
            table = %request.table,
            key = %request.key,
            compaction_id = %request.compaction_id,
            history = %history,
            "Wrote compaction"
        );
        Ok(CompactionReport {
            deleted: 0,
            compaction_written: true,
            history,
        })
    }

    fn store_compacted_deltas(
        &self,
        key: &Key,
        histories: &[History],
        _consistency: WriteConsistency,
    ) -> SorResult<()> {
        self.history
            .append_history(key.table(), key.key(), histories)
    }

    fn purge_unsafe(&self, table: &str) -> SorResult<()> {
        validate_table_name(table)?;
        self.store.purge_table(table)?;
        warn!(target: "sor::dao", table, "Purged table");
        Ok(())
    }
}
