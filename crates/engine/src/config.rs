//! Configuration via `sor.toml`
//!
//! A single config file in the service's data directory. On first start a
//! default `sor.toml` is created; to change settings, edit the file and
//! restart.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sor_core::{SorError, SorResult, Timestamp};
use sor_storage::{DaoConfig, DEFAULT_COLUMN_BATCH_SIZE, DEFAULT_MAX_BACKOFF};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "sor.toml";

/// Default lock path contended by expiration monitors.
pub const DEFAULT_LOCK_PATH: &str = "/leader/min-split-size";

/// Default service name of the expiration monitor.
pub const DEFAULT_SERVICE_NAME: &str = "min-split-size-cleanup-monitor";

/// Default full-consistency delay in milliseconds (`i32::MAX`).
pub const DEFAULT_FULL_CONSISTENCY_DELAY_MS: u64 = i32::MAX as u64;

/// Leader-elected expiration monitor settings, the `[expiration]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpirationConfig {
    /// Coordination path all monitor instances contend for
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    /// Name used for the monitor's thread and logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Wait between failed or lost leadership attempts, in seconds
    #[serde(default = "default_reacquire_delay_secs")]
    pub reacquire_delay_secs: u64,
    /// Interval between cleanup runs, in seconds; the first run is aligned
    /// to the next UTC midnight
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

fn default_lock_path() -> String {
    DEFAULT_LOCK_PATH.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_reacquire_delay_secs() -> u64 {
    60
}

fn default_period_secs() -> u64 {
    86_400
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            service_name: default_service_name(),
            reacquire_delay_secs: default_reacquire_delay_secs(),
            period_secs: default_period_secs(),
        }
    }
}

impl ExpirationConfig {
    /// Wait between leadership attempts
    pub fn reacquire_delay(&self) -> Duration {
        Duration::from_secs(self.reacquire_delay_secs)
    }

    /// Interval between cleanup runs
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    fn validate(&self) -> SorResult<()> {
        if self.lock_path.is_empty() {
            return Err(SorError::invalid_input("expiration.lock_path must not be empty"));
        }
        if self.service_name.is_empty() {
            return Err(SorError::invalid_input(
                "expiration.service_name must not be empty",
            ));
        }
        if self.period_secs == 0 {
            return Err(SorError::invalid_input(
                "expiration.period_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Service configuration loaded from `sor.toml`.
///
/// # Example
///
/// ```toml
/// column_batch_size = 50
/// full_consistency_delay_ms = 2147483647
///
/// [expiration]
/// lock_path = "/leader/min-split-size"
/// period_secs = 86400
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SorConfig {
    /// Timeline entries read eagerly per record.
    #[serde(default = "default_column_batch_size")]
    pub column_batch_size: usize,
    /// How far the full-consistency watermark trails the clock.
    #[serde(default = "default_full_consistency_delay_ms")]
    pub full_consistency_delay_ms: u64,
    /// Fixed full-consistency watermark (epoch millis), for tests and replays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_consistency_timestamp_ms: Option<u64>,
    /// Upper bound on one retry backoff sleep.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
    /// Expiration monitor settings.
    #[serde(default)]
    pub expiration: ExpirationConfig,
}

fn default_column_batch_size() -> usize {
    DEFAULT_COLUMN_BATCH_SIZE
}

fn default_full_consistency_delay_ms() -> u64 {
    DEFAULT_FULL_CONSISTENCY_DELAY_MS
}

fn default_max_retry_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF.as_millis() as u64
}

impl Default for SorConfig {
    fn default() -> Self {
        Self {
            column_batch_size: default_column_batch_size(),
            full_consistency_delay_ms: default_full_consistency_delay_ms(),
            full_consistency_timestamp_ms: None,
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            expiration: ExpirationConfig::default(),
        }
    }
}

impl SorConfig {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> SorResult<()> {
        if self.column_batch_size == 0 {
            return Err(SorError::invalid_input(format!(
                "column_batch_size must be at least 1 in {}",
                CONFIG_FILE_NAME
            )));
        }
        self.expiration.validate()
    }

    /// Storage settings derived from this config.
    pub fn dao_config(&self) -> DaoConfig {
        DaoConfig {
            column_batch_size: self.column_batch_size,
            full_consistency_delay: Duration::from_millis(self.full_consistency_delay_ms),
            full_consistency_timestamp: self.full_consistency_timestamp_ms.map(Timestamp::from_millis),
            max_retry_backoff: Duration::from_millis(self.max_retry_backoff_ms),
            ..DaoConfig::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# System-of-record configuration
#
# Timeline entries read eagerly per record; the rest is paged lazily.
column_batch_size = 50

# How far (ms) the full-consistency watermark trails the clock.
# The default is effectively "never": set a real replication delay.
full_consistency_delay_ms = 2147483647

# Pin the full-consistency watermark (epoch millis) for replays.
# full_consistency_timestamp_ms = 0

# Upper bound (ms) on one backoff sleep when a read races a writer.
max_retry_backoff_ms = 250

[expiration]
lock_path = "/leader/min-split-size"
service_name = "min-split-size-cleanup-monitor"
reacquire_delay_secs = 60
period_secs = 86400
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> SorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SorError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: SorConfig = toml::from_str(&content).map_err(|e| {
            SorError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> SorResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                SorError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> SorResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SorError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            SorError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
