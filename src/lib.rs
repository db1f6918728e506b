//! Log Manager core for a topic-partitioned, append-only message log broker.
//! Owns the on-disk collection of per-`(topic, partition)` append logs:
//! discovers and recovers them on startup, routes produce/fetch traffic to
//! the correct log, creates new logs on demand, periodically flushes dirty
//! logs, and enforces retention by age and by aggregate size.
//!
//! [`registry`] holds the topic/partition map, [`loader`] reconstructs it at
//! startup, [`flush`] and [`retention`] are the two background sweeps,
//! [`partition`] chooses partitions for new writes, [`publisher`] announces
//! new topics to an external coordination service, and [`manager`] ties all
//! of the above together behind one public API with a startup/shutdown
//! lifecycle. [`log`] and [`segment`] supply the concrete `Log`/`LogSegment`
//! realization the other modules operate on.

pub mod config;
pub mod error;
pub mod flush;
pub mod loader;
pub mod log;
pub mod manager;
pub mod partition;
pub mod publisher;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod segment;

pub use config::LogManagerConfig;
pub use error::{ConfigError, GetOrCreateError, InvalidPartitionError, LogError};
pub use log::{FsLog, Log};
pub use manager::LogManager;
pub use publisher::{NoopRegistryClient, RegistryClient};
pub use segment::{FixedSizeRollingStrategy, LogSegment, RollingStrategy};

/// Initializes a `tracing-subscriber` `EnvFilter` for binaries and tests
/// that want human-readable log output. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
