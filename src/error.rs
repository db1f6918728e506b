//! Crate-wide error types, in the style of `chroma-error`: a small set of
//! broker-level error codes plus a trait mapping each concrete error to one.

use std::fmt;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCodes {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
    Unavailable,
}

/// A trait implemented by every error type in this crate so callers can
/// branch on severity without downcasting each concrete variant.
pub trait LogManagerError: std::error::Error + Send + Sync {
    fn code(&self) -> ErrorCodes;
}

/// Errors surfaced by [`crate::manager::LogManager::load`] and by
/// configuration parsing.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("log directory {0} exists but is not a directory")]
    NotADirectory(std::path::PathBuf),
    #[error("failed to create or read log directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

impl LogManagerError for ConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Internal
    }
}

/// Errors surfaced synchronously to callers of `get_log` / `get_or_create_log`
/// and friends. Never logged as an error: may be driven by client input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidPartitionError {
    #[error("topic name must not be empty")]
    EmptyTopic,
    #[error("partition {partition} out of range for topic '{topic}' (0..{bound})")]
    OutOfRange {
        topic: String,
        partition: i32,
        bound: i32,
    },
}

impl LogManagerError for InvalidPartitionError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// Errors raised by the `Log` contract: recoverable I/O during close or
/// delete, and the fatal flush-path I/O error.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("I/O error on log {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("directory name '{0}' is not a well-formed <topic>-<partition> name")]
    MalformedDirName(String),
}

impl LogManagerError for LogError {
    fn code(&self) -> ErrorCodes {
        match self {
            LogError::Io(..) => ErrorCodes::Unavailable,
            LogError::MalformedDirName(_) => ErrorCodes::InvalidArgument,
        }
    }
}

/// Errors surfaced by [`crate::manager::LogManager::get_or_create_log`]:
/// either input validation or a
/// disk failure while constructing the new Log's directory/segment under
/// the creation mutex.
#[derive(thiserror::Error, Debug)]
pub enum GetOrCreateError {
    #[error(transparent)]
    InvalidPartition(#[from] InvalidPartitionError),
    #[error("failed to create log directory for '{topic}-{partition}': {source}")]
    Create {
        topic: String,
        partition: i32,
        #[source]
        source: std::io::Error,
    },
}

impl LogManagerError for GetOrCreateError {
    fn code(&self) -> ErrorCodes {
        match self {
            GetOrCreateError::InvalidPartition(e) => e.code(),
            GetOrCreateError::Create { .. } => ErrorCodes::Unavailable,
        }
    }
}

/// Parses a directory name of the form `<topic>-<partition>`: the rightmost
/// `-` separates the decimal partition from the topic name.
pub fn parse_topic_partition(name: &str) -> Result<(String, i32), LogError> {
    let idx = name
        .rfind('-')
        .ok_or_else(|| LogError::MalformedDirName(name.to_string()))?;
    let (topic, rest) = name.split_at(idx);
    let partition_str = &rest[1..];
    if topic.is_empty() || partition_str.is_empty() {
        return Err(LogError::MalformedDirName(name.to_string()));
    }
    let partition: i32 = partition_str
        .parse()
        .map_err(|_| LogError::MalformedDirName(name.to_string()))?;
    if partition < 0 {
        return Err(LogError::MalformedDirName(name.to_string()));
    }
    Ok((topic.to_string(), partition))
}

impl fmt::Display for ErrorCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_names() {
        assert_eq!(
            parse_topic_partition("orders-0").unwrap(),
            ("orders".to_string(), 0)
        );
        assert_eq!(
            parse_topic_partition("orders-12").unwrap(),
            ("orders".to_string(), 12)
        );
    }

    #[test]
    fn rightmost_dash_wins_on_hyphenated_topics() {
        assert_eq!(
            parse_topic_partition("multi-word-topic-3").unwrap(),
            ("multi-word-topic".to_string(), 3)
        );
    }

    #[test]
    fn rejects_missing_dash() {
        assert!(parse_topic_partition("orders0").is_err());
    }

    #[test]
    fn rejects_non_decimal_suffix() {
        assert!(parse_topic_partition("orders-abc").is_err());
        assert!(parse_topic_partition("orders-").is_err());
        assert!(parse_topic_partition("-0").is_err());
    }

}
