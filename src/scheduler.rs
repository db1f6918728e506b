//! The retention sweep's periodic driver: a small dedicated task per
//! schedule, the same shape as [`crate::flush::FlushScheduler`], but
//! parameterized with the initial delay the Loader installs it with.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// A cancellable periodic task: fires once after `initial_delay`, then every
/// `period` until `close`d.
pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(initial_delay: Duration, period: Duration, mut tick: F) -> PeriodicTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let cancel_worker = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel_worker.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            tick().await;
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel_worker.cancelled() => break,
                    _ = interval.tick() => {
                        tick().await;
                    }
                }
            }
        });
        PeriodicTask {
            cancel,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "periodic task panicked");
            }
        }
    }
}
