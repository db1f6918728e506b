//! Configuration surface, loaded the way `chroma-log`/
//! `chroma-config` load theirs: a `serde`-deserializable struct with
//! per-field defaults, assembled through `figment`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogManagerConfig {
    /// Absolute path to the root directory holding one subdirectory per
    /// `(topic, partition)`.
    pub log_dir: PathBuf,

    #[serde(default = "LogManagerConfig::default_num_partitions")]
    pub num_partitions: i32,

    #[serde(default)]
    pub topic_partitions_map: HashMap<String, i32>,

    #[serde(default = "LogManagerConfig::default_flush_interval_messages")]
    pub flush_interval: u64,

    #[serde(default = "LogManagerConfig::default_flush_scheduler_thread_rate_ms")]
    pub flush_scheduler_thread_rate_ms: u64,

    #[serde(default = "LogManagerConfig::default_default_flush_interval_ms")]
    pub default_flush_interval_ms: u64,

    #[serde(default)]
    pub flush_interval_map: HashMap<String, u64>,

    #[serde(default = "LogManagerConfig::default_log_cleanup_interval_ms")]
    pub log_cleanup_interval_ms: u64,

    #[serde(default = "LogManagerConfig::default_log_cleanup_default_age_ms")]
    pub log_cleanup_default_age_ms: i64,

    #[serde(default)]
    pub log_retention_hours_map: HashMap<String, i64>,

    #[serde(default = "LogManagerConfig::default_log_retention_size")]
    pub log_retention_size: i64,

    #[serde(default = "LogManagerConfig::default_log_file_size")]
    pub log_file_size: u64,

    #[serde(default)]
    pub enable_zookeeper: bool,
}

impl LogManagerConfig {
    fn default_num_partitions() -> i32 {
        1
    }

    fn default_flush_interval_messages() -> u64 {
        10_000
    }

    fn default_flush_scheduler_thread_rate_ms() -> u64 {
        3_000
    }

    fn default_default_flush_interval_ms() -> u64 {
        60_000
    }

    fn default_log_cleanup_interval_ms() -> u64 {
        60_000
    }

    fn default_log_cleanup_default_age_ms() -> i64 {
        7 * 24 * 3_600_000
    }

    fn default_log_retention_size() -> i64 {
        -1
    }

    fn default_log_file_size() -> u64 {
        1024 * 1024 * 1024
    }

    /// Partition count for `topic`: the per-topic override if present,
    /// otherwise the broker-wide default.
    pub fn partitions_for(&self, topic: &str) -> i32 {
        self.topic_partitions_map
            .get(topic)
            .copied()
            .unwrap_or(self.num_partitions)
    }

    /// Flush interval for `topic`, in milliseconds.
    pub fn flush_interval_for(&self, topic: &str) -> u64 {
        self.flush_interval_map
            .get(topic)
            .copied()
            .unwrap_or(self.default_flush_interval_ms)
    }

    /// Retention age threshold for `topic`, in milliseconds. `log_retention_hours_map`
    /// is stored in hours and converted by multiplying by `3_600_000`.
    pub fn retention_age_ms_for(&self, topic: &str) -> i64 {
        self.log_retention_hours_map
            .get(topic)
            .map(|hours| hours * 3_600_000)
            .unwrap_or(self.log_cleanup_default_age_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_partitions < 1 {
            return Err(ConfigError::Invalid(
                figment::Error::from("numPartitions must be >= 1".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        LogManagerConfig {
            log_dir: PathBuf::from("./logs"),
            num_partitions: Self::default_num_partitions(),
            topic_partitions_map: HashMap::new(),
            flush_interval: Self::default_flush_interval_messages(),
            flush_scheduler_thread_rate_ms: Self::default_flush_scheduler_thread_rate_ms(),
            default_flush_interval_ms: Self::default_default_flush_interval_ms(),
            flush_interval_map: HashMap::new(),
            log_cleanup_interval_ms: Self::default_log_cleanup_interval_ms(),
            log_cleanup_default_age_ms: Self::default_log_cleanup_default_age_ms(),
            log_retention_hours_map: HashMap::new(),
            log_retention_size: Self::default_log_retention_size(),
            log_file_size: Self::default_log_file_size(),
            enable_zookeeper: false,
        }
    }
}

/// Loads configuration by layering a YAML file (if present) and environment
/// variables prefixed `LOGMGR_` over the struct defaults, mirroring the
/// `figment`-based layering pattern used for configuration throughout this
/// crate.
pub fn load_config(yaml_path: Option<&std::path::Path>) -> Result<LogManagerConfig, ConfigError> {
    use figment::providers::{Env, Format, Serialized, Yaml};
    use figment::Figment;

    let mut figment = Figment::from(Serialized::defaults(LogManagerConfig::default()));
    if let Some(path) = yaml_path {
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed("LOGMGR_"));
    let config: LogManagerConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_topic_override_wins_over_default() {
        let mut cfg = LogManagerConfig::default();
        cfg.num_partitions = 4;
        cfg.topic_partitions_map.insert("orders".to_string(), 8);
        assert_eq!(cfg.partitions_for("orders"), 8);
        assert_eq!(cfg.partitions_for("events"), 4);
    }

    #[test]
    fn retention_hours_convert_to_millis_and_back() {
        let mut cfg = LogManagerConfig::default();
        cfg.log_retention_hours_map.insert("orders".to_string(), 48);
        let ms = cfg.retention_age_ms_for("orders");
        assert_eq!(ms, 48 * 3_600_000);
        assert_eq!(ms / 3_600_000, 48);
    }

    #[test]
    fn rejects_zero_partitions() {
        let mut cfg = LogManagerConfig::default();
        cfg.num_partitions = 0;
        assert!(cfg.validate().is_err());
    }
}
