//! Loader: scans the log directory at startup, reconstructs
//! the registry, and recovers open segments.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::LogManagerConfig;
use crate::error::{parse_topic_partition, ConfigError};
use crate::log::{FsLog, Log};
use crate::registry::LogRegistry;
use crate::segment::RollingStrategy;

/// Ensures `log_dir` exists (creating it if absent) and is a readable
/// directory.
pub fn ensure_log_dir(log_dir: &Path) -> Result<(), ConfigError> {
    if log_dir.exists() {
        if !log_dir.is_dir() {
            return Err(ConfigError::NotADirectory(log_dir.to_path_buf()));
        }
        return Ok(());
    }
    std::fs::create_dir_all(log_dir).map_err(|source| ConfigError::Io {
        path: log_dir.to_path_buf(),
        source,
    })
}

/// Scans `log_dir` for `(topic, partition)` subdirectories and populates
/// `registry` with recovered `Log`s. Directories that are not well-formed,
/// or are not directories at all, are skipped with a warning rather than
/// failing the whole load.
pub fn scan_and_recover(
    log_dir: &Path,
    registry: &LogRegistry,
    rolling_strategy: Arc<dyn RollingStrategy>,
) -> Result<(), ConfigError> {
    let entries = std::fs::read_dir(log_dir).map_err(|source| ConfigError::Io {
        path: log_dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to read directory entry under log dir, skipping");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            warn!(path = %path.display(), "skipping non-directory entry under log dir");
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => {
                warn!(path = %path.display(), "skipping entry with non-UTF8 name");
                continue;
            }
        };
        let (topic, partition) = match parse_topic_partition(&name) {
            Ok(tp) => tp,
            Err(e) => {
                warn!(dir = %name, error = %e, "skipping directory with malformed name");
                continue;
            }
        };
        match FsLog::recover(path.clone(), topic.clone(), partition, Arc::clone(&rolling_strategy)) {
            Ok(log) => {
                let log: Arc<dyn Log> = Arc::new(log);
                registry.insert_log_if_absent(&topic, partition, log);
            }
            Err(e) => {
                warn!(dir = %name, error = %e, "failed to recover log, skipping");
            }
        }
    }
    Ok(())
}

/// Ensures the log directory exists and scans it into `registry`. Installing
/// the retention task and starting the registry client/publisher are
/// orchestrated by [`crate::manager::LogManager`], which owns the scheduler
/// handles and the registry client.
pub fn load(
    config: &LogManagerConfig,
    registry: &LogRegistry,
    rolling_strategy: Arc<dyn RollingStrategy>,
) -> Result<(), ConfigError> {
    ensure_log_dir(&config.log_dir)?;
    scan_and_recover(&config.log_dir, registry, rolling_strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_then_query_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["orders-0", "orders-1", "events-0"] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }

        let registry = LogRegistry::new();
        let strategy = FsLog::default_rolling_strategy(1024);
        let mut config = LogManagerConfig::default();
        config.log_dir = tmp.path().to_path_buf();
        load(&config, &registry, strategy).unwrap();

        assert!(registry.get("orders", 0).is_some());
        assert!(registry.get("orders", 1).is_some());
        assert!(registry.get("events", 0).is_some());
        assert!(registry.get("orders", 2).is_none());

        let mut topics = registry.all_topics();
        topics.sort();
        assert_eq!(topics, vec!["events".to_string(), "orders".to_string()]);
    }

    #[test]
    fn skips_malformed_directory_names_and_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("no_dash_here")).unwrap();
        std::fs::write(tmp.path().join("orders-0"), b"not a directory").unwrap();
        std::fs::create_dir_all(tmp.path().join("valid-2")).unwrap();

        let registry = LogRegistry::new();
        let strategy = FsLog::default_rolling_strategy(1024);
        let mut config = LogManagerConfig::default();
        config.log_dir = tmp.path().to_path_buf();
        load(&config, &registry, strategy).unwrap();

        assert!(registry.get("valid", 2).is_some());
        assert_eq!(registry.all_topics().len(), 1);
    }

    #[test]
    fn creates_missing_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("fresh");
        assert!(!log_dir.exists());
        ensure_log_dir(&log_dir).unwrap();
        assert!(log_dir.is_dir());
    }

    #[test]
    fn rejects_log_dir_that_is_a_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("not-a-dir");
        std::fs::write(&file_path, b"oops").unwrap();
        assert!(ensure_log_dir(&file_path).is_err());
    }
}
