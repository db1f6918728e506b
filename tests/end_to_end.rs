//! End-to-end scenarios exercised against the public `LogManager` surface
//! rather than individual module internals.

use std::sync::Arc;
use std::time::Duration;

use log_manager::{LogManager, LogManagerConfig};

fn config(log_dir: &std::path::Path) -> LogManagerConfig {
    let mut config = LogManagerConfig::default();
    config.log_dir = log_dir.to_path_buf();
    config.log_cleanup_interval_ms = 3_600_000;
    config
}

#[tokio::test]
async fn load_then_query_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    for dir in ["orders-0", "orders-1", "events-0"] {
        std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }
    let mut cfg = config(tmp.path());
    cfg.num_partitions = 2;
    let manager = LogManager::new(cfg, None);
    manager.load().await.unwrap();
    manager.startup().await;

    assert!(manager.get_log("orders", 0).await.unwrap().is_some());
    assert!(manager.get_log("orders", 1).await.unwrap().is_some());
    assert!(manager.get_log("events", 0).await.unwrap().is_some());
    assert!(manager.get_log("orders", 2).await.is_err());

    let mut topics = manager.all_topics();
    topics.sort();
    assert_eq!(topics, vec!["events".to_string(), "orders".to_string()]);

    manager.close().await;
}

#[tokio::test]
async fn startup_then_close_touches_no_existing_segment_files() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("orders-0")).unwrap();
    std::fs::write(
        tmp.path().join("orders-0").join(format!("{:020}.log", 0)),
        b"hello",
    )
    .unwrap();

    let manager = LogManager::new(config(tmp.path()), None);
    manager.load().await.unwrap();
    manager.startup().await;
    manager.close().await;

    let contents = std::fs::read(tmp.path().join("orders-0").join(format!("{:020}.log", 0))).unwrap();
    assert_eq!(contents, b"hello");
}

#[tokio::test]
async fn create_race_yields_one_directory_and_one_log_reference() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = Arc::new(LogManager::new(config(tmp.path()), None));
    manager.load().await.unwrap();
    manager.startup().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(
            async move { manager.get_or_create_log("new", 0).await.unwrap() },
        ));
    }
    let mut logs = Vec::new();
    for h in handles {
        logs.push(h.await.unwrap());
    }
    let first_ptr = Arc::as_ptr(&logs[0]);
    assert!(logs.iter().all(|l| Arc::as_ptr(l) == first_ptr));

    let new_dirs: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("new-"))
        .collect();
    assert_eq!(new_dirs.len(), 1);

    manager.close().await;
}

#[tokio::test]
async fn flush_cadence_respects_per_topic_override() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.flush_scheduler_thread_rate_ms = 20;
    cfg.default_flush_interval_ms = 1000;
    cfg.flush_interval_map.insert("fast".to_string(), 30);

    let manager = LogManager::new(cfg, None);
    manager.load().await.unwrap();

    let fast = manager.get_or_create_log("fast", 0).await.unwrap();
    let slow = manager.get_or_create_log("slow", 0).await.unwrap();
    let fast_initial = fast.last_flushed_time();
    let slow_initial = slow.last_flushed_time();

    manager.startup().await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(fast.last_flushed_time() >= fast_initial);
    assert_eq!(slow.last_flushed_time(), slow_initial);

    manager.close().await;
}
