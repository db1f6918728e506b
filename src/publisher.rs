//! Registry Publisher: a single background worker draining an
//! unbounded queue of newly-seen topic names and announcing them to the
//! external registry service. The registry client itself is a small
//! collaborator trait, not an inheritance parent, with a no-op
//! implementation so the manager "must function fully" without one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl crate::error::LogManagerError for RegistryError {
    fn code(&self) -> crate::error::ErrorCodes {
        crate::error::ErrorCodes::Unavailable
    }
}

/// The external coordination service used to advertise the broker and its
/// topics. Registration is idempotent.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn start(&self) -> Result<(), RegistryError>;
    async fn register_broker(&self) -> Result<(), RegistryError>;
    async fn register_topic(&self, topic: &str) -> Result<(), RegistryError>;
    async fn close(&self) -> Result<(), RegistryError>;
}

/// Used when `enableZookeeper` is false: the manager must
/// function fully without a real registry.
#[derive(Debug, Default)]
pub struct NoopRegistryClient;

#[async_trait]
impl RegistryClient for NoopRegistryClient {
    async fn start(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn register_broker(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn register_topic(&self, _topic: &str) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Drains an unbounded FIFO queue of topic names and calls
/// `register_topic` on each. Best-effort: a failed registration is logged
/// and not retried (registration is idempotent on the registry side).
pub struct RegistryPublisher {
    sender: mpsc::UnboundedSender<String>,
    stopped: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RegistryPublisher {
    pub fn start(client: Arc<dyn RegistryClient>) -> RegistryPublisher {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_worker = Arc::clone(&stopped);
        let worker = tokio::spawn(async move {
            while let Some(topic) = receiver.recv().await {
                if topic.is_empty() {
                    // Reserved wakeup token for shutdown.
                    if stopped_worker.load(Ordering::SeqCst) {
                        break;
                    }
                    continue;
                }
                match client.register_topic(&topic).await {
                    Ok(()) => info!(topic = %topic, "announced topic to registry"),
                    Err(e) => warn!(topic = %topic, error = %e, "failed to announce topic, not retrying"),
                }
            }
        });
        RegistryPublisher {
            sender,
            stopped,
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Enqueues `topic` for asynchronous announcement. Non-blocking: the
    /// channel is unbounded, so this never waits on the worker.
    pub fn enqueue(&self, topic: String) {
        if self.sender.send(topic).is_err() {
            error!("registry publisher worker is gone; dropping enqueue");
        }
    }

    /// Sets the stop flag, wakes the worker with an empty-string token, and
    /// joins it.
    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.sender.send(String::new());
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "registry publisher worker panicked");
            }
        }
    }
}
