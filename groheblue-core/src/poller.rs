//! Periodic dashboard refresh.
//!
//! A [`DashboardPoller`] fetches the dashboard on a fixed interval and
//! publishes the latest snapshot on a `watch` channel. A failed fetch is
//! logged and skipped; subscribers keep seeing the previous snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::client::GroheClient;
use crate::dashboard::DashboardSnapshot;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Latest snapshot, `None` until the first successful fetch.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<DashboardSnapshot>>>;

/// Fetches the dashboard of one client on an interval.
#[derive(Debug)]
pub struct DashboardPoller {
    client: Arc<GroheClient>,
    interval: Duration,
}

impl DashboardPoller {
    /// Create a poller that fetches through `client` every `interval`.
    pub fn new(client: Arc<GroheClient>, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Start polling on the current runtime. The first fetch happens at once.
    pub fn spawn(self) -> PollerHandle {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.client.fetch_dashboard().await {
                    Ok(snapshot) => {
                        if snapshot.is_empty() {
                            tracing::warn!("Dashboard lists no locations");
                        }
                        tracing::debug!(appliances = snapshot.appliances().len(), "Dashboard updated");
                        tx.send_replace(Some(Arc::new(snapshot)));
                    }
                    Err(e) => {
                        tracing::warn!("Skipping dashboard update: {}", e);
                    }
                }
            }
        });

        PollerHandle { rx, task }
    }
}

/// Handle to a running poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    rx: SnapshotReceiver,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// A new receiver of snapshot updates.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.rx.clone()
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<Arc<DashboardSnapshot>> {
        self.rx.borrow().clone()
    }

    /// Stop polling and wait for the task to finish.
    pub async fn stop(mut self) {
        self.task.abort();
        log_exit((&mut self.task).await);
    }
}

/// Log how the polling task ended. Returns `true` if it panicked.
fn log_exit(result: Result<(), JoinError>) -> bool {
    match result {
        Err(e) if e.is_panic() => {
            tracing::error!("Dashboard poller panicked: {}", e);
            true
        }
        Err(_) => {
            tracing::debug!("Dashboard poller stopped");
            false
        }
        Ok(()) => false,
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
