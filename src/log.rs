//! The external `Log` contract consumed by the core and its
//! concrete, file-backed realization `FsLog`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::LogError;
use crate::segment::{FixedSizeRollingStrategy, LogSegment, RollingStrategy};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

fn system_time_to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The contract the Log Manager core consumes. Kept
/// object-safe (`&mut dyn FnMut`, not a generic) so it can live behind
/// `Arc<dyn Log>` in the registry.
#[async_trait]
pub trait Log: Send + Sync + std::fmt::Debug {
    fn topic_name(&self) -> &str;
    fn dir(&self) -> &Path;
    async fn size(&self) -> u64;
    async fn flush(&self) -> Result<(), LogError>;
    fn last_flushed_time(&self) -> i64;
    /// Iterates segments oldest-first, offering each to `filter` (the active
    /// segment is never offered), stopping at the first rejection. Returns
    /// the accepted prefix, already marked for deletion but not yet unlinked.
    async fn mark_deleted_while(
        &self,
        filter: &mut dyn FnMut(&LogSegment) -> bool,
    ) -> Vec<LogSegment>;
    /// Closes the segment's backing handle (best-effort) and unlinks the
    /// file, returning whether the unlink actually succeeded.
    async fn delete_segment(&self, segment: &LogSegment) -> bool;
    async fn get_offsets_before(&self, timestamp_ms: i64) -> Vec<i64>;
    async fn close(&self) -> Result<(), LogError>;
}

/// Default empty response when a log is absent.
pub fn get_empty_offsets() -> Vec<i64> {
    Vec::new()
}

/// A file-backed `Log`: one directory per `(topic, partition)`, one file per
/// segment. Segments are tracked in ascending `base_offset`
/// order; the last entry is always the active segment and is never offered
/// to a retention filter.
pub struct FsLog {
    topic: String,
    partition: i32,
    dir: PathBuf,
    segments: Mutex<Vec<LogSegment>>,
    last_flushed_time: AtomicI64,
    rolling_strategy: Arc<dyn RollingStrategy>,
    // Test-only fault injection for the fatal flush-halt path.
    fail_next_flush: AtomicBool,
}

impl std::fmt::Debug for FsLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsLog")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("dir", &self.dir)
            .finish()
    }
}

impl FsLog {
    /// Creates the Log's directory and an empty active segment at offset 0.
    /// Used by `get_or_create_log` under the creation mutex.
    pub fn create(
        root: &Path,
        topic: &str,
        partition: i32,
        rolling_strategy: Arc<dyn RollingStrategy>,
    ) -> std::io::Result<FsLog> {
        let dir = root.join(format!("{}-{}", topic, partition));
        std::fs::create_dir_all(&dir)?;
        let seg_path = dir.join(LogSegment::file_name(0));
        if !seg_path.exists() {
            std::fs::File::create(&seg_path)?;
        }
        let segment = LogSegment::open(&dir, 0)?;
        Ok(FsLog {
            topic: topic.to_string(),
            partition,
            dir,
            segments: Mutex::new(vec![segment]),
            last_flushed_time: AtomicI64::new(now_millis()),
            rolling_strategy,
            fail_next_flush: AtomicBool::new(false),
        })
    }

    /// Reopens an existing Log directory, scanning for segment files
    /// (the Loader's recovery path).
    pub fn recover(
        dir: PathBuf,
        topic: String,
        partition: i32,
        rolling_strategy: Arc<dyn RollingStrategy>,
    ) -> std::io::Result<FsLog> {
        let mut segments = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(base_offset) = LogSegment::parse_base_offset(&file_name) {
                segments.push(LogSegment::open(&dir, base_offset)?);
            }
        }
        segments.sort_by_key(|s| s.base_offset);
        if segments.is_empty() {
            let seg_path = dir.join(LogSegment::file_name(0));
            std::fs::File::create(&seg_path)?;
            segments.push(LogSegment::open(&dir, 0)?);
        }
        Ok(FsLog {
            topic,
            partition,
            dir,
            segments: Mutex::new(segments),
            last_flushed_time: AtomicI64::new(now_millis()),
            rolling_strategy,
            fail_next_flush: AtomicBool::new(false),
        })
    }

    pub fn default_rolling_strategy(log_file_size: u64) -> Arc<dyn RollingStrategy> {
        Arc::new(FixedSizeRollingStrategy::new(log_file_size))
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Test-only: force the next `flush()` call to return an `IOError`,
    /// to exercise the flush scheduler's fatal-halt path without real disk
    /// faults.
    #[doc(hidden)]
    pub fn inject_flush_fault(&self) {
        self.fail_next_flush.store(true, Ordering::SeqCst);
    }

    /// Appends a new, empty segment at `base_offset` and makes it active.
    /// Exercised by tests that need multiple segments; production code
    /// would call this from the (out-of-scope) append path when the
    /// installed `RollingStrategy` decides to roll.
    pub fn roll(&self, base_offset: u64) -> std::io::Result<()> {
        let seg_path = self.dir.join(LogSegment::file_name(base_offset));
        std::fs::File::create(&seg_path)?;
        let segment = LogSegment::open(&self.dir, base_offset)?;
        self.segments.lock().push(segment);
        Ok(())
    }

    pub fn rolling_strategy(&self) -> &Arc<dyn RollingStrategy> {
        &self.rolling_strategy
    }
}

#[async_trait]
impl Log for FsLog {
    fn topic_name(&self) -> &str {
        &self.topic
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn size(&self) -> u64 {
        self.segments.lock().iter().map(|s| s.size()).sum()
    }

    async fn flush(&self) -> Result<(), LogError> {
        if self.fail_next_flush.swap(false, Ordering::SeqCst) {
            return Err(LogError::Io(
                format!("{}-{}", self.topic, self.partition),
                std::io::Error::new(std::io::ErrorKind::Other, "injected flush fault"),
            ));
        }
        let active_path = {
            let mut segments = self.segments.lock();
            for segment in segments.iter_mut() {
                let _ = segment.refresh();
            }
            segments.last().map(|s| s.path.clone())
        };
        if let Some(path) = active_path {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| LogError::Io(path.display().to_string(), e))?;
            file.sync_all()
                .await
                .map_err(|e| LogError::Io(path.display().to_string(), e))?;
        }
        self.last_flushed_time.store(now_millis(), Ordering::SeqCst);
        Ok(())
    }

    fn last_flushed_time(&self) -> i64 {
        self.last_flushed_time.load(Ordering::SeqCst)
    }

    async fn mark_deleted_while(
        &self,
        filter: &mut dyn FnMut(&LogSegment) -> bool,
    ) -> Vec<LogSegment> {
        let segments = self.segments.lock();
        if segments.len() <= 1 {
            // Only the active segment exists; nothing is eligible.
            return Vec::new();
        }
        let mut accepted = Vec::new();
        // Oldest-to-newest order, excluding the last (active) segment.
        for segment in &segments[..segments.len() - 1] {
            if filter(segment) {
                accepted.push(segment.clone());
            } else {
                break;
            }
        }
        accepted
    }

    async fn delete_segment(&self, segment: &LogSegment) -> bool {
        // "Close its backing message set" - this implementation keeps no
        // open handle per inactive segment, so closing is a no-op.
        let was_tracked = {
            let mut segments = self.segments.lock();
            match segments.iter().position(|s| s.base_offset == segment.base_offset) {
                Some(idx) => {
                    segments.remove(idx);
                    true
                }
                None => false,
            }
        };
        if !was_tracked {
            debug!(base_offset = segment.base_offset, "segment already removed");
            return false;
        }
        match tokio::fs::remove_file(&segment.path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %segment.path.display(), error = %e, "failed to delete segment file");
                false
            }
        }
    }

    async fn get_offsets_before(&self, timestamp_ms: i64) -> Vec<i64> {
        self.segments
            .lock()
            .iter()
            .filter(|s| system_time_to_millis(s.last_modified()) <= timestamp_ms)
            .map(|s| s.base_offset as i64)
            .collect()
    }

    async fn close(&self) -> Result<(), LogError> {
        Ok(())
    }
}
