//! `LogManager`: the top-level orchestrator that wires together the Log
//! Registry, the Loader, the Flush Scheduler, the Retention Engine, the
//! Partition Chooser, the Registry Publisher, and the coordinated
//! startup/shutdown lifecycle behind one public API surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::LogManagerConfig;
use crate::error::{GetOrCreateError, InvalidPartitionError, LogError};
use crate::flush::{FlushScheduler, HardHalt, ProcessHalt};
use crate::loader;
use crate::log::{FsLog, Log};
use crate::partition::PartitionChooser;
use crate::publisher::{NoopRegistryClient, RegistryClient, RegistryPublisher};
use crate::registry::{InsertWitness, LogRegistry};
use crate::retention;
use crate::scheduler::PeriodicTask;
use crate::segment::{FixedSizeRollingStrategy, RollingStrategy};

/// Serializes Log construction (directory creation + instantiation) across
/// racing `get_or_create_log` callers for the same `(topic, partition)`.
/// Coarse: it only ever guards Log construction, never I/O on
/// already-registered logs.
type CreationMutex = tokio::sync::Mutex<()>;

/// One-shot gate released after broker self-announcement completes. Absent
/// in effect (never awaited) when registry integration is disabled.
struct StartupBarrier {
    notify: Notify,
    released: AtomicBool,
}

impl StartupBarrier {
    fn new() -> Self {
        StartupBarrier {
            notify: Notify::new(),
            released: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Waits for `release`, unless it already fired. A wait that never
    /// completes (the caller's task is cancelled) simply never returns,
    /// rather than surfacing as an error — there is nothing to recover from
    /// in that case.
    ///
    /// Per `tokio::sync::Notify`'s documented pattern, the `Notified` future
    /// must be constructed *before* checking the flag: `notify_waiters`
    /// (called from `release`) only wakes waiters that already exist at the
    /// time of the call, so checking the flag first and constructing the
    /// `Notified` future second leaves a gap in which a `release` between
    /// the two steps is missed and the waiter hangs forever.
    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.released.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
            if self.released.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

/// The Log Manager core. Owns the registry, the background
/// schedulers, and (optionally) the registry-service collaborators.
pub struct LogManager {
    config: Arc<LogManagerConfig>,
    registry: Arc<LogRegistry>,
    creation_mutex: CreationMutex,
    rolling_strategy: parking_lot::Mutex<Option<Arc<dyn RollingStrategy>>>,
    partition_chooser: PartitionChooser,
    loaded: AtomicBool,

    flush_scheduler: parking_lot::Mutex<Option<FlushScheduler>>,
    retention_task: parking_lot::Mutex<Option<PeriodicTask>>,
    halt: Arc<dyn ProcessHalt>,

    registry_client: Option<Arc<dyn RegistryClient>>,
    publisher: parking_lot::Mutex<Option<RegistryPublisher>>,
    startup_barrier: StartupBarrier,
}

impl LogManager {
    /// Builds a manager that has not yet been `load`ed. Registry integration
    /// is controlled by `config.enable_zookeeper`; pass `None`
    /// for `registry_client` to use the no-op collaborator even when
    /// integration is enabled (useful in tests).
    pub fn new(config: LogManagerConfig, registry_client: Option<Arc<dyn RegistryClient>>) -> Self {
        let registry_client = if config.enable_zookeeper {
            Some(registry_client.unwrap_or_else(|| Arc::new(NoopRegistryClient) as Arc<dyn RegistryClient>))
        } else {
            None
        };
        LogManager {
            config: Arc::new(config),
            registry: Arc::new(LogRegistry::new()),
            creation_mutex: tokio::sync::Mutex::new(()),
            rolling_strategy: parking_lot::Mutex::new(None),
            partition_chooser: PartitionChooser::new(),
            loaded: AtomicBool::new(false),
            flush_scheduler: parking_lot::Mutex::new(None),
            retention_task: parking_lot::Mutex::new(None),
            halt: Arc::new(HardHalt),
            registry_client,
            publisher: parking_lot::Mutex::new(None),
            startup_barrier: StartupBarrier::new(),
        }
    }

    /// Overrides the `ProcessHalt` escalation hook (default: hard process
    /// exit). Exposed so embedders and tests can observe fatal-flush
    /// escalation instead of actually terminating.
    pub fn set_process_halt(&mut self, halt: Arc<dyn ProcessHalt>) {
        self.halt = halt;
    }

    /// Installs a rolling strategy to use for Logs created from this point
    /// on. Must be called before `load` or the default
    /// (`FixedSizeRollingStrategy(logFileSize)`) is installed.
    pub fn set_rolling_strategy(&self, strategy: Arc<dyn RollingStrategy>) {
        *self.rolling_strategy.lock() = Some(strategy);
    }

    fn rolling_strategy(&self) -> Arc<dyn RollingStrategy> {
        let mut guard = self.rolling_strategy.lock();
        if guard.is_none() {
            *guard = Some(Arc::new(FixedSizeRollingStrategy::new(self.config.log_file_size)));
        }
        guard.as_ref().unwrap().clone()
    }

    /// Scans the log directory, populates the registry, and installs the
    /// retention task (and the registry client/publisher, if enabled). May
    /// be called at most once per instance; a second call is a programmer
    /// error and panics rather than silently re-scanning a live registry.
    pub async fn load(&self) -> Result<(), crate::error::ConfigError> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            panic!("LogManager::load called more than once");
        }
        let strategy = self.rolling_strategy();
        loader::load(&self.config, &self.registry, strategy)?;

        let retention_config = Arc::clone(&self.config);
        let retention_registry = Arc::clone(&self.registry);
        let period = Duration::from_millis(self.config.log_cleanup_interval_ms);
        let initial_delay = Duration::from_secs(60);
        let task = PeriodicTask::spawn(initial_delay, period, move || {
            let config = Arc::clone(&retention_config);
            let registry = Arc::clone(&retention_registry);
            async move {
                let deleted = retention::retention_sweep(&registry, &config).await;
                if deleted > 0 {
                    info!(deleted, "retention sweep removed segments");
                }
            }
        });
        *self.retention_task.lock() = Some(task);

        if let Some(client) = &self.registry_client {
            client.start().await.map_err(|e| crate::error::ConfigError::Io {
                path: self.config.log_dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
            // Enqueuing the currently-loaded topics is `startup`'s job
            // (spec.md §4.7 step 1), not `load`'s — do it there, not here,
            // or every topic gets announced twice on a normal startup.
            let publisher = RegistryPublisher::start(Arc::clone(client));
            *self.publisher.lock() = Some(publisher);
        }
        Ok(())
    }

    /// Coordinated startup: announce to the registry and
    /// release the startup barrier, then start the flush scheduler.
    pub async fn startup(&self) {
        if let Some(client) = &self.registry_client {
            if let Err(e) = client.register_broker().await {
                warn!(error = %e, "failed to register broker with registry");
            }
            if let Some(publisher) = self.publisher.lock().as_ref() {
                for topic in self.registry.all_topics() {
                    publisher.enqueue(topic);
                }
            }
        }
        self.startup_barrier.release();

        let scheduler = FlushScheduler::start(
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            Arc::clone(&self.halt),
        );
        *self.flush_scheduler.lock() = Some(scheduler);
    }

    /// Coordinated shutdown: stop the flush scheduler and
    /// retention task, close every Log best-effort, then drain the
    /// publisher and close the registry client.
    pub async fn close(&self) {
        if let Some(scheduler) = self.flush_scheduler.lock().take() {
            scheduler.close().await;
        }
        if let Some(task) = self.retention_task.lock().take() {
            task.close().await;
        }
        for log in self.registry.all_logs() {
            if let Err(e) = log.close().await {
                warn!(topic = log.topic_name(), error = %e, "error closing log during shutdown");
            }
        }
        if let Some(client) = &self.registry_client {
            if let Some(publisher) = self.publisher.lock().take() {
                publisher.shutdown().await;
            }
            if let Err(e) = client.close().await {
                warn!(error = %e, "error closing registry client");
            }
        }
    }

    fn partition_bound(&self, topic: &str) -> i32 {
        self.config.partitions_for(topic)
    }

    /// `get_log`: validates partition bounds first, then
    /// performs a non-blocking lookup. Waits on the startup barrier first
    /// when registry integration is enabled.
    pub async fn get_log(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Option<Arc<dyn Log>>, InvalidPartitionError> {
        if self.registry_client.is_some() {
            self.startup_barrier.wait().await;
        }
        let bound = self.partition_bound(topic);
        LogRegistry::validate_partition(topic, partition, bound)?;
        Ok(self.registry.get(topic, partition))
    }

    /// `get_or_create_log`: the two-phase insert-if-absent
    /// protocol. Construction of a brand-new Log happens under
    /// `creation_mutex`; a losing draft is dropped without being inserted
    /// (its directory may already exist on disk, which is harmless since
    /// the winner's directory is the same path).
    pub async fn get_or_create_log(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<dyn Log>, GetOrCreateError> {
        if self.registry_client.is_some() {
            self.startup_barrier.wait().await;
        }
        let bound = self.partition_bound(topic);
        LogRegistry::validate_partition(topic, partition, bound)?;

        if let Some(existing) = self.registry.get(topic, partition) {
            return Ok(existing);
        }

        let (_, topic_witness) = self.registry.insert_topic_if_absent(topic);

        let log = {
            let _guard = self.creation_mutex.lock().await;
            // Re-check after acquiring the mutex: another racer may have
            // finished constructing and inserting while we waited.
            if let Some(existing) = self.registry.get(topic, partition) {
                existing
            } else {
                let strategy = self.rolling_strategy();
                let draft = FsLog::create(&self.config.log_dir, topic, partition, strategy)
                    .map_err(|source| GetOrCreateError::Create {
                        topic: topic.to_string(),
                        partition,
                        source,
                    })?;
                let draft: Arc<dyn Log> = Arc::new(draft);
                let (winner, _, slot_witness) =
                    self.registry.insert_log_if_absent(topic, partition, draft);
                if slot_witness == InsertWitness::AlreadyPresent {
                    info!(topic, partition, "lost log-creation race, discarding draft");
                }
                winner
            }
        };

        if topic_witness == InsertWitness::Inserted {
            if let Some(publisher) = self.publisher.lock().as_ref() {
                publisher.enqueue(topic.to_string());
            }
        }

        Ok(log)
    }

    pub fn choose_partition(&self, topic: &str) -> i32 {
        self.partition_chooser.choose_partition(topic, &self.config)
    }

    pub fn all_topics(&self) -> Vec<String> {
        self.registry.all_topics()
    }

    pub fn all_logs_iter(&self) -> Vec<Arc<dyn Log>> {
        self.registry.all_logs()
    }

    /// `get_offsets(request)`: answers an offset-before query
    /// for `(topic, partition)`, or the static empty response if the log is
    /// absent.
    pub async fn get_offsets(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
    ) -> Result<Vec<i64>, InvalidPartitionError> {
        match self.get_log(topic, partition).await? {
            Some(log) => Ok(log.get_offsets_before(timestamp_ms).await),
            None => Ok(crate::log::get_empty_offsets()),
        }
    }

    pub fn get_topic_partitions_map(&self) -> std::collections::HashMap<String, i32> {
        self.config.topic_partitions_map.clone()
    }

    pub fn config(&self) -> &LogManagerConfig {
        &self.config
    }
}

/// Surfaces a `LogError::Io` from segment deletion/close as a plain warning
/// rather than a fatal condition: retention I/O is recoverable, unlike the
/// flush path.
pub fn log_recoverable_io_error(context: &str, err: &LogError) {
    warn!(context, error = %err, "recoverable I/O error");
}
