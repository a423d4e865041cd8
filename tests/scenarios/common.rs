//! Shared helpers for the scenario suites.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use sordb::{
    ChangeId, DataDao, DataWriter, Delta, InMemoryHistoryStore, InMemoryTimelineStore, Key,
    RecordUpdate, SorConfig,
};
use tracing_subscriber::filter::LevelFilter;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's captured stdout.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(LevelFilter::DEBUG)
            .try_init();
    });
}

/// DAO over fresh in-memory stores, configured from a `sor.toml` snippet.
pub struct TestDao {
    pub dao: Arc<DataDao>,
    pub history: Arc<InMemoryHistoryStore>,
    pub config: SorConfig,
}

impl TestDao {
    pub fn from_toml(toml_text: &str) -> Self {
        init_tracing();
        let config: SorConfig = toml::from_str(toml_text).unwrap();
        config.validate().unwrap();
        let history = Arc::new(InMemoryHistoryStore::new());
        let dao = DataDao::from_config(
            Arc::new(InMemoryTimelineStore::new()),
            history.clone(),
            &config.dao_config(),
        )
        .unwrap();
        TestDao {
            dao: Arc::new(dao),
            history,
            config,
        }
    }

    pub fn new() -> Self {
        Self::from_toml("")
    }

    /// Write one delta with an id at `millis`.
    pub fn write_at(&self, table: &str, key: &str, millis: u64, delta: Delta) -> ChangeId {
        let id = ChangeId::from_millis(millis);
        self.dao
            .update(&RecordUpdate::new(table, key, id, delta))
            .unwrap();
        id
    }

    /// Write a literal document under each of `keys`.
    pub fn populate(&self, table: &str, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            let delta = Delta::literal(serde_json::json!({ "key": key }));
            self.dao
                .update(&RecordUpdate::new(table, key, ChangeId::now(), delta))
                .unwrap();
        }
    }
}

pub fn key(table: &str, key: &str) -> Key {
    Key::new(table, key).unwrap()
}
