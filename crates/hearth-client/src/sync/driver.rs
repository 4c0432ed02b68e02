use super::{Reconciler, SyncOutcome};
use crate::network_status::NetworkStatus;
use crate::pending_count::PendingCountProjector;
use crate::retry::RetryPolicy;
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle for nudging or stopping a running [`SyncDriver`]
#[derive(Clone)]
pub struct SyncHandle {
    trigger: Arc<Notify>,
    shutdown: mpsc::Sender<()>,
}

impl SyncHandle {
    /// Ask for a reconciliation pass. Repeated calls before the driver
    /// wakes collapse into one.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(()).await;
    }
}

/// Background task that runs the [`Reconciler`] whenever the network comes
/// back, when asked to, and on a backoff schedule while records keep
/// failing.
pub struct SyncDriver {
    reconciler: Arc<Reconciler>,
    network: NetworkStatus,
    projector: PendingCountProjector,
    state: AppState,
    policy: RetryPolicy,
    failed_passes: u32,
    retry_at: Option<Instant>,
}

impl SyncDriver {
    pub fn new(
        reconciler: Arc<Reconciler>,
        network: NetworkStatus,
        projector: PendingCountProjector,
        state: AppState,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            reconciler,
            network,
            projector,
            state,
            policy,
            failed_passes: 0,
            retry_at: None,
        }
    }

    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = SyncHandle {
            trigger: trigger.clone(),
            shutdown: shutdown_tx,
        };
        let task = tokio::spawn(self.run(trigger, shutdown_rx));

        (handle, task)
    }

    async fn run(mut self, trigger: Arc<Notify>, mut shutdown: mpsc::Receiver<()>) {
        let mut online_rx = self.network.subscribe();
        let online = *online_rx.borrow_and_update();
        self.state.set_online(online).await;

        // Records left over from a previous session
        if online {
            self.sync().await;
        }

        loop {
            let deadline = self.retry_at;
            let backoff = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    self.state.set_online(online).await;

                    if online {
                        self.failed_passes = 0;
                        self.sync().await;
                    } else {
                        self.retry_at = None;
                    }
                }
                _ = trigger.notified() => {
                    if self.network.is_online() {
                        self.sync().await;
                    } else {
                        tracing::debug!("Sync requested while offline, waiting for the network");
                    }
                }
                _ = backoff => {
                    self.retry_at = None;
                    if self.network.is_online() {
                        self.sync().await;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sync driver shutting down");
                    break;
                }
            }
        }
    }

    async fn sync(&mut self) {
        let report = match self.reconciler.run().await {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::AlreadyRunning => return,
        };

        self.projector.refresh().await;
        self.state.record_sync(report).await;

        if report.failed > 0 && self.network.is_online() {
            let delay = self.policy.jittered_delay(self.failed_passes);
            self.failed_passes = self.failed_passes.saturating_add(1);
            self.retry_at = Some(Instant::now() + delay);
            tracing::info!(
                "{} messages still pending, retrying in {:.1}s",
                report.failed,
                delay.as_secs_f64()
            );
        } else {
            self.failed_passes = 0;
            self.retry_at = None;
        }
    }
}
