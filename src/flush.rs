//! Flush Scheduler: a dedicated single-worker periodic task that flushes
//! every Log whose dirty interval has elapsed, driven by `tokio::select!`
//! over a `CancellationToken` and a `tokio::time` interval rather than a raw
//! OS thread loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::LogManagerConfig;
use crate::registry::LogRegistry;

/// Escalation hook for a fatal flush-path I/O error. The default
/// implementation halts the process; tests inject a recording fake so the
/// halt path is exercised without killing the test process.
pub trait ProcessHalt: Send + Sync {
    fn halt(&self, reason: &str) -> !;
}

#[derive(Debug, Default)]
pub struct HardHalt;

impl ProcessHalt for HardHalt {
    fn halt(&self, reason: &str) -> ! {
        tracing::error!(reason, "fatal flush failure, halting process");
        std::process::exit(1);
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Runs one flush tick over every Log in `registry`: flushes any Log whose
/// dirty interval has elapsed. On a fatal `IOError` from `flush()`,
/// escalates through `halt` and does not continue with the remaining logs
/// (a hard halt, not a normal return).
pub async fn flush_tick(
    registry: &LogRegistry,
    config: &LogManagerConfig,
    halt: &dyn ProcessHalt,
) {
    let now = now_millis();
    for log in registry.all_logs() {
        let effective_interval = config.flush_interval_for(log.topic_name()) as i64;
        let since_last_flush = now - log.last_flushed_time();
        if since_last_flush >= effective_interval {
            if let Err(e) = log.flush().await {
                halt.halt(&format!(
                    "flush failed for topic '{}': {e}",
                    log.topic_name()
                ));
            }
        }
    }
}

/// Owns the dedicated flush task. `start` spawns exactly one worker that
/// ticks at the configured rate; `close` cancels it and waits for the
/// in-flight tick to finish.
pub struct FlushScheduler {
    cancel: CancellationToken,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    pub fn start(
        registry: Arc<LogRegistry>,
        config: Arc<LogManagerConfig>,
        halt: Arc<dyn ProcessHalt>,
    ) -> FlushScheduler {
        let cancel = CancellationToken::new();
        let cancel_worker = cancel.clone();
        let rate = Duration::from_millis(config.flush_scheduler_thread_rate_ms);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(rate);
            loop {
                tokio::select! {
                    _ = cancel_worker.cancelled() => break,
                    _ = interval.tick() => {
                        flush_tick(&registry, &config, halt.as_ref()).await;
                    }
                }
            }
        });
        FlushScheduler {
            cancel,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Cancels the worker and waits for the in-flight tick to complete.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "flush scheduler task panicked");
            }
        }
    }
}

/// A `ProcessHalt` used by tests: records the reason instead of exiting.
#[derive(Default)]
pub struct RecordingHalt {
    pub halted: std::sync::Mutex<Option<String>>,
}

impl ProcessHalt for RecordingHalt {
    fn halt(&self, reason: &str) -> ! {
        *self.halted.lock().unwrap() = Some(reason.to_string());
        // This fake cannot truly diverge without killing the test process;
        // panicking is the closest stand-in and is caught by callers that
        // run the tick inside `std::panic::catch_unwind` or a spawned task.
        panic!("halt: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::FsLog;

    #[tokio::test]
    async fn flush_tick_respects_per_topic_interval_override() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let mut config = LogManagerConfig::default();
        config.default_flush_interval_ms = 1000;
        config.flush_interval_map.insert("fast".to_string(), 0);

        let strategy = FsLog::default_rolling_strategy(1024);
        let fast_log: Arc<dyn crate::log::Log> =
            Arc::new(FsLog::create(tmp.path(), "fast", 0, strategy.clone()).unwrap());
        let slow_log: Arc<dyn crate::log::Log> =
            Arc::new(FsLog::create(tmp.path(), "slow", 0, strategy).unwrap());
        registry.insert_log_if_absent("fast", 0, fast_log.clone());
        registry.insert_log_if_absent("slow", 0, slow_log.clone());

        let before_fast = fast_log.last_flushed_time();
        let before_slow = slow_log.last_flushed_time();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let halt = Arc::new(RecordingHalt::default());
        flush_tick(&registry, &config, halt.as_ref()).await;

        assert!(fast_log.last_flushed_time() >= before_fast);
        assert_eq!(slow_log.last_flushed_time(), before_slow);
        assert!(halt.halted.lock().unwrap().is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "halt:")]
    async fn fatal_flush_error_halts() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let mut config = LogManagerConfig::default();
        config.default_flush_interval_ms = 0;

        let strategy = FsLog::default_rolling_strategy(1024);
        let log = FsLog::create(tmp.path(), "broken", 0, strategy).unwrap();
        log.inject_flush_fault();
        let log: Arc<dyn crate::log::Log> = Arc::new(log);
        registry.insert_log_if_absent("broken", 0, log);

        let halt = RecordingHalt::default();
        flush_tick(&registry, &config, &halt).await;
    }
}
