//! Retention Engine: age-based and size-based segment
//! cleanup, invoked by an externally supplied scheduler.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::LogManagerConfig;
use crate::log::Log;
use crate::registry::LogRegistry;
use crate::segment::LogSegment;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

fn millis_since(modified: SystemTime, now_ms: i64) -> i64 {
    let modified_ms = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    now_ms - modified_ms
}

/// Age-based cleanup. Scans segments oldest-to-newest and stops at the
/// first one that fails the predicate, so only a contiguous oldest prefix
/// is ever marked.
pub async fn cleanup_expired_segments(log: &dyn Log, threshold_ms: i64) -> Vec<LogSegment> {
    let now_ms = now_millis();
    let mut filter = move |segment: &LogSegment| {
        millis_since(segment.last_modified(), now_ms) > threshold_ms
    };
    log.mark_deleted_while(&mut filter).await
}

/// Size-based cleanup. Skips entirely when retention is unbounded
/// (`log_retention_size < 0`) or the Log already fits. Builds a stateful
/// filter with a running `diff` that must reach `>= 0` before it stops
/// accepting deletions, relying on oldest-to-newest evaluation order.
pub async fn cleanup_segments_to_maintain_size(
    log: &dyn Log,
    log_retention_size: i64,
) -> Vec<LogSegment> {
    if log_retention_size < 0 {
        return Vec::new();
    }
    let size = log.size().await as i64;
    if size < log_retention_size {
        return Vec::new();
    }
    let mut diff = size - log_retention_size;
    let mut filter = move |segment: &LogSegment| {
        diff -= segment.size() as i64;
        diff >= 0
    };
    log.mark_deleted_while(&mut filter).await
}

/// Closes and unlinks each marked segment independently; a failed deletion
/// does not prevent the next attempt. Counts only segments that were
/// actually unlinked; a failed `delete()` is not counted as a success.
pub async fn delete_segments(log: &dyn Log, segments: &[LogSegment]) -> usize {
    let mut deleted = 0;
    for segment in segments {
        let success = log.delete_segment(segment).await;
        info!(
            log = log.topic_name(),
            path = %segment.path.display(),
            success,
            "retention delete"
        );
        if success {
            deleted += 1;
        } else {
            warn!(
                log = log.topic_name(),
                path = %segment.path.display(),
                "failed to delete segment during retention sweep"
            );
        }
    }
    deleted
}

/// One retention sweep over every Log in `registry`: age-based then
/// size-based cleanup, per Log, summing counts.
pub async fn retention_sweep(registry: &LogRegistry, config: &LogManagerConfig) -> usize {
    let mut total_deleted = 0;
    for log in registry.all_logs() {
        let threshold = config.retention_age_ms_for(log.topic_name());
        let expired = cleanup_expired_segments(log.as_ref(), threshold).await;
        total_deleted += delete_segments(log.as_ref(), &expired).await;

        let oversized =
            cleanup_segments_to_maintain_size(log.as_ref(), config.log_retention_size).await;
        total_deleted += delete_segments(log.as_ref(), &oversized).await;
    }
    total_deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::FsLog;
    use std::time::Duration;

    fn write_segment(dir: &std::path::Path, base_offset: u64, size: usize) {
        let path = dir.join(LogSegment::file_name(base_offset));
        std::fs::write(&path, vec![0u8; size]).unwrap();
    }

    fn set_mtime(dir: &std::path::Path, base_offset: u64, age: Duration) {
        let path = dir.join(LogSegment::file_name(base_offset));
        let mtime = filetime::FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(&path, mtime).unwrap();
    }

    #[tokio::test]
    async fn size_based_sweep_preserves_active_segment_even_over_quota() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = FsLog::default_rolling_strategy(u64::MAX);
        // seed 4 segments: three 10MB, one 5MB (active)
        write_segment(tmp.path(), 0, 10 * 1024 * 1024);
        write_segment(tmp.path(), 1, 10 * 1024 * 1024);
        write_segment(tmp.path(), 2, 10 * 1024 * 1024);
        write_segment(tmp.path(), 3, 5 * 1024 * 1024);
        let log =
            FsLog::recover(tmp.path().to_path_buf(), "orders".to_string(), 0, strategy).unwrap();

        let retention_size = 12 * 1024 * 1024;
        let marked = cleanup_segments_to_maintain_size(&log, retention_size).await;
        assert_eq!(marked.len(), 2);
        let deleted = delete_segments(&log, &marked).await;
        assert_eq!(deleted, 2);
        assert_eq!(log.size().await, 15 * 1024 * 1024);
    }

    #[tokio::test]
    async fn size_retention_is_noop_when_unbounded() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = FsLog::default_rolling_strategy(u64::MAX);
        let log = FsLog::recover(tmp.path().to_path_buf(), "orders".to_string(), 0, strategy).unwrap();
        let marked = cleanup_segments_to_maintain_size(&log, -1).await;
        assert!(marked.is_empty());
    }

    #[tokio::test]
    async fn age_based_sweep_keeps_contiguous_newest_suffix() {
        // Three non-active segments at t0-4h, t0-2h, t0-30min plus a fresh
        // active segment (base offset 3). The filter scans oldest-first and
        // does not stop until it hits a segment younger than the threshold,
        // so both the 4h and 2h segments are marked; the 30-min segment and
        // the active segment survive.
        let tmp = tempfile::tempdir().unwrap();
        let strategy = FsLog::default_rolling_strategy(u64::MAX);
        write_segment(tmp.path(), 0, 1);
        write_segment(tmp.path(), 1, 1);
        write_segment(tmp.path(), 2, 1);
        write_segment(tmp.path(), 3, 1);
        set_mtime(tmp.path(), 0, Duration::from_secs(4 * 3600));
        set_mtime(tmp.path(), 1, Duration::from_secs(2 * 3600));
        set_mtime(tmp.path(), 2, Duration::from_secs(30 * 60));
        let log = FsLog::recover(tmp.path().to_path_buf(), "orders".to_string(), 0, strategy).unwrap();

        let threshold_ms = 3600 * 1000; // 1 hour
        let marked = cleanup_expired_segments(&log, threshold_ms).await;
        assert_eq!(marked.len(), 2);
        assert_eq!(marked[0].base_offset, 0);
        assert_eq!(marked[1].base_offset, 1);

        let deleted = delete_segments(&log, &marked).await;
        assert_eq!(deleted, 2);
        // Segment 2 (30 min old) and the active segment 3 both survive.
        assert_eq!(log.size().await, 2);
    }

    #[tokio::test]
    async fn repeated_sweeps_with_no_new_writes_are_a_fixed_point() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = FsLog::default_rolling_strategy(u64::MAX);
        write_segment(tmp.path(), 0, 1);
        write_segment(tmp.path(), 1, 1);
        set_mtime(tmp.path(), 0, Duration::from_secs(4 * 3600));
        let log = FsLog::recover(tmp.path().to_path_buf(), "orders".to_string(), 0, strategy).unwrap();

        let threshold_ms = 3600 * 1000;
        let marked = cleanup_expired_segments(&log, threshold_ms).await;
        delete_segments(&log, &marked).await;
        let second_pass = cleanup_expired_segments(&log, threshold_ms).await;
        assert!(second_pass.is_empty());
    }
}
