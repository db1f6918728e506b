//! The `LogSegment` / `RollingStrategy` contracts: the minimal file-backed
//! segment realization, with base-offset-named files and pluggable roll
//! conditions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Segment file names are zero-padded decimal base offsets so that lexical
/// and numeric ordering agree, matching the Kafka/iggy convention.
pub const BASE_OFFSET_WIDTH: usize = 20;
pub const SEGMENT_EXTENSION: &str = "log";

/// A single immutable-by-age file within a `Log`.
#[derive(Debug, Clone)]
pub struct LogSegment {
    pub base_offset: u64,
    pub path: PathBuf,
    size: u64,
    last_modified: SystemTime,
}

impl LogSegment {
    pub fn file_name(base_offset: u64) -> String {
        format!("{:0width$}.{}", base_offset, SEGMENT_EXTENSION, width = BASE_OFFSET_WIDTH)
    }

    /// Parses a segment file name back into its base offset, the inverse of
    /// [`LogSegment::file_name`].
    pub fn parse_base_offset(file_name: &str) -> Option<u64> {
        file_name
            .strip_suffix(&format!(".{}", SEGMENT_EXTENSION))
            .and_then(|stem| stem.parse().ok())
    }

    pub fn open(dir: &Path, base_offset: u64) -> io::Result<LogSegment> {
        let path = dir.join(Self::file_name(base_offset));
        let meta = fs::metadata(&path)?;
        Ok(LogSegment {
            base_offset,
            path,
            size: meta.len(),
            last_modified: meta.modified()?,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    pub fn refresh(&mut self) -> io::Result<()> {
        let meta = fs::metadata(&self.path)?;
        self.size = meta.len();
        self.last_modified = meta.modified()?;
        Ok(())
    }
}

/// A pure predicate/decision module that, given the active segment's
/// projected size after an append of `incoming_bytes`, decides whether to
/// roll.
pub trait RollingStrategy: Send + Sync + std::fmt::Debug {
    fn should_roll(&self, active_segment_size: u64, incoming_bytes: u64) -> bool;
}

/// The default rolling strategy: roll once the active segment would exceed
/// a fixed byte threshold.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeRollingStrategy {
    pub log_file_size: u64,
}

impl FixedSizeRollingStrategy {
    pub fn new(log_file_size: u64) -> Self {
        FixedSizeRollingStrategy { log_file_size }
    }
}

impl RollingStrategy for FixedSizeRollingStrategy {
    fn should_roll(&self, active_segment_size: u64, incoming_bytes: u64) -> bool {
        active_segment_size + incoming_bytes > self.log_file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_round_trips() {
        for base in [0u64, 1, 42, 1_000_000_000] {
            let name = LogSegment::file_name(base);
            assert_eq!(LogSegment::parse_base_offset(&name), Some(base));
        }
    }

    #[test]
    fn lexical_order_matches_numeric_order() {
        let mut names: Vec<String> = [100u64, 2, 30, 1].iter().map(|b| LogSegment::file_name(*b)).collect();
        let mut sorted_numeric = names.clone();
        sorted_numeric.sort();
        names.sort();
        assert_eq!(names, sorted_numeric);
    }

    #[test]
    fn fixed_size_strategy_rolls_past_threshold() {
        let strategy = FixedSizeRollingStrategy::new(100);
        assert!(!strategy.should_roll(50, 40));
        assert!(strategy.should_roll(50, 60));
    }
}
