//! Partition configuration.

use crate::error::{CoreError, CoreResult};
use crate::wal::SyncMode;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for opening a partition backend.
///
/// Can be built in code with the builder methods or deserialized from the
/// JSON options a queue passes to its backend:
///
/// ```rust
/// use persisting_core::Config;
///
/// let config = Config::from_options(&serde_json::json!({
///     "wal_sync_interval": 0.5,
///     "batch_size": 500,
/// }))
/// .unwrap();
/// assert_eq!(config.batch_size, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ConfigOptions")]
pub struct Config {
    /// Whether records go through the write-ahead log before the buffer.
    pub enable_wal: bool,

    /// How often the WAL is forced to disk.
    ///
    /// `None` leaves syncing to the OS, zero syncs every append.
    pub wal_sync_interval: Option<Duration>,

    /// WAL size in bytes above which the partition flushes and rotates.
    pub max_wal_size: u64,

    /// Buffered record count that triggers an automatic flush.
    pub batch_size: usize,

    /// Whether operation counters are reported in stats.
    pub enable_metrics: bool,

    /// Number of mergeable small sink batches that triggers compaction after
    /// a flush (0 = never).
    pub compaction_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_wal: true,
            wal_sync_interval: None,
            max_wal_size: 64 * 1024 * 1024, // 64 MB
            batch_size: 100,
            enable_metrics: true,
            compaction_threshold: 10,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the WAL is enabled.
    #[must_use]
    pub const fn enable_wal(mut self, value: bool) -> Self {
        self.enable_wal = value;
        self
    }

    /// Sets the WAL sync interval.
    #[must_use]
    pub const fn wal_sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.wal_sync_interval = interval;
        self
    }

    /// Sets the maximum WAL size before rotation.
    #[must_use]
    pub const fn max_wal_size(mut self, size: u64) -> Self {
        self.max_wal_size = size;
        self
    }

    /// Sets the automatic flush threshold.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets whether metrics are reported.
    #[must_use]
    pub const fn enable_metrics(mut self, value: bool) -> Self {
        self.enable_metrics = value;
        self
    }

    /// Sets the compaction threshold.
    #[must_use]
    pub const fn compaction_threshold(mut self, batches: usize) -> Self {
        self.compaction_threshold = batches;
        self
    }

    /// The sync mode implied by `wal_sync_interval`.
    pub fn sync_mode(&self) -> SyncMode {
        SyncMode::from_interval(self.wal_sync_interval)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a zero batch size or a zero
    /// maximum WAL size.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::invalid_config("batch_size must be at least 1"));
        }
        if self.max_wal_size == 0 {
            return Err(CoreError::invalid_config("max_wal_size must be positive"));
        }
        Ok(())
    }

    /// Parses backend options.
    ///
    /// `wal_sync_interval` is given in (fractional) seconds. Keys this
    /// backend does not know are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if a known key has the wrong type
    /// or an invalid value.
    pub fn from_options(options: &serde_json::Value) -> CoreResult<Self> {
        if options.is_null() {
            return Ok(Self::default());
        }
        let raw = ConfigOptions::deserialize(options)
            .map_err(|e| CoreError::invalid_config(e.to_string()))?;
        Self::try_from(raw)
    }
}

/// Wire form of [`Config`] as found in backend options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigOptions {
    enable_wal: Option<bool>,
    wal_sync_interval: Option<f64>,
    max_wal_size: Option<u64>,
    batch_size: Option<usize>,
    enable_metrics: Option<bool>,
    compaction_threshold: Option<usize>,
}

impl TryFrom<ConfigOptions> for Config {
    type Error = CoreError;

    fn try_from(raw: ConfigOptions) -> CoreResult<Self> {
        let defaults = Config::default();
        let wal_sync_interval = match raw.wal_sync_interval {
            None => None,
            Some(secs) if secs.is_nan() || secs < 0.0 => {
                return Err(CoreError::invalid_config(format!(
                    "wal_sync_interval must be a non-negative number of seconds, got {secs}"
                )));
            }
            Some(secs) => Some(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| CoreError::invalid_config(format!("wal_sync_interval: {e}")))?,
            ),
        };

        let config = Config {
            enable_wal: raw.enable_wal.unwrap_or(defaults.enable_wal),
            wal_sync_interval,
            max_wal_size: raw.max_wal_size.unwrap_or(defaults.max_wal_size),
            batch_size: raw.batch_size.unwrap_or(defaults.batch_size),
            enable_metrics: raw.enable_metrics.unwrap_or(defaults.enable_metrics),
            compaction_threshold: raw
                .compaction_threshold
                .unwrap_or(defaults.compaction_threshold),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.enable_wal);
        assert_eq!(config.wal_sync_interval, None);
        assert_eq!(config.max_wal_size, 64 * 1024 * 1024);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.sync_mode(), SyncMode::Async);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .enable_wal(false)
            .batch_size(5)
            .max_wal_size(1024)
            .wal_sync_interval(Some(Duration::ZERO));

        assert!(!config.enable_wal);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_wal_size, 1024);
        assert_eq!(config.sync_mode(), SyncMode::Sync);
    }

    #[test]
    fn options_in_seconds() {
        let config = Config::from_options(&json!({"wal_sync_interval": 0.25})).unwrap();
        assert_eq!(config.wal_sync_interval, Some(Duration::from_millis(250)));
        assert_eq!(
            config.sync_mode(),
            SyncMode::Batch(Duration::from_millis(250))
        );
    }

    #[test]
    fn unknown_options_are_ignored() {
        let config = Config::from_options(&json!({"partition_key": "id", "batch_size": 7})).unwrap();
        assert_eq!(config.batch_size, 7);
    }

    #[test]
    fn null_options_give_defaults() {
        assert_eq!(
            Config::from_options(&serde_json::Value::Null).unwrap(),
            Config::default()
        );
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(Config::from_options(&json!({"batch_size": 0})).is_err());
        assert!(Config::from_options(&json!({"max_wal_size": 0})).is_err());
        assert!(Config::from_options(&json!({"wal_sync_interval": -1.0})).is_err());
        assert!(Config::from_options(&json!({"enable_wal": "yes"})).is_err());
    }

    #[test]
    fn deserializes_through_serde() {
        let config: Config = serde_json::from_str(r#"{"enable_wal": false}"#).unwrap();
        assert!(!config.enable_wal);
        assert_eq!(config.batch_size, 100);
    }
}
