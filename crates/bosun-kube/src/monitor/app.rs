//! Per-application monitor
//!
//! Owns at most one [`WatchGroup`] and folds its readings into a
//! [`StatusBoard`]. Every new informer list first publishes an all-missing
//! status, then replaces the watch group. Further publishes are throttled.

use std::sync::Arc;
use std::time::Duration;

use bosun_core::{AppStatus, ResourceState, StatusBoard, StatusInformer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::group::WatchGroup;
use crate::registry::KindRegistry;

/// Buffered readings between watch tasks and the app loop
const READING_BUFFER: usize = 256;

/// How long a stopping app monitor may take to wind down
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle held by the [`super::Monitor`] for one application
pub(crate) struct AppMonitorHandle {
    sequence: i64,
    tx: mpsc::Sender<Vec<StatusInformer>>,
    task: JoinHandle<()>,
}

impl AppMonitorHandle {
    pub(crate) fn spawn(
        app_id: String,
        sequence: i64,
        registry: Arc<KindRegistry>,
        throttle: Duration,
        status_tx: mpsc::Sender<AppStatus>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let monitor = AppMonitor {
            app_id,
            sequence,
            registry,
            throttle,
            status_tx,
        };
        let task = tokio::spawn(monitor.run(rx));
        Self { sequence, tx, task }
    }

    pub(crate) fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Replace the watched informers
    pub(crate) async fn update(&self, informers: Vec<StatusInformer>) -> bool {
        self.tx.send(informers).await.is_ok()
    }

    /// Cancel the monitor and its watch group, and wait for them
    ///
    /// Closing the informer channel lets the loop cancel its group; a loop
    /// stuck publishing to a consumer that stopped reading is aborted.
    pub(crate) async fn stop(self) {
        let Self { tx, mut task, .. } = self;
        drop(tx);

        let joined = match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("app monitor did not stop in time, aborting");
                task.abort();
                task.await
            }
        };
        match joined {
            Err(e) if !e.is_cancelled() => warn!(error = %e, "app monitor panicked"),
            _ => {}
        }
    }
}

struct AppMonitor {
    app_id: String,
    sequence: i64,
    registry: Arc<KindRegistry>,
    throttle: Duration,
    status_tx: mpsc::Sender<AppStatus>,
}

impl AppMonitor {
    async fn run(self, mut informer_rx: mpsc::Receiver<Vec<StatusInformer>>) {
        let (_, mut reading_rx) = mpsc::channel::<ResourceState>(READING_BUFFER);
        let mut group: Option<WatchGroup> = None;
        let mut board = StatusBoard::default();
        let mut dirty = false;
        let mut next_publish = Instant::now();

        info!(app = %self.app_id, sequence = self.sequence, "app monitor started");

        loop {
            tokio::select! {
                informers = informer_rx.recv() => {
                    let Some(informers) = informers else {
                        break;
                    };
                    if let Some(previous) = group.take() {
                        previous.cancel().await;
                    }

                    // Readings of the cancelled group must not reach the new board
                    let (reading_tx, rx) = mpsc::channel(READING_BUFFER);
                    reading_rx = rx;

                    let keys: Vec<_> = informers.iter().map(StatusInformer::key).collect();
                    board = StatusBoard::new(&keys);
                    dirty = false;
                    let initial = AppStatus::all_missing(&self.app_id, self.sequence, &keys);
                    if !self.publish(initial).await {
                        break;
                    }
                    next_publish = Instant::now() + self.throttle;

                    let started = WatchGroup::start(&self.registry, &informers, reading_tx);
                    debug!(app = %self.app_id, watches = started.len(), informers = keys.len(), "watch group started");
                    group = Some(started);
                }
                Some(reading) = reading_rx.recv() => {
                    if board.merge(&reading) {
                        dirty = true;
                    }
                }
                _ = sleep_until(next_publish), if dirty => {
                    if !self.publish(board.to_status(&self.app_id, self.sequence)).await {
                        break;
                    }
                    dirty = false;
                    next_publish = Instant::now() + self.throttle;
                }
            }
        }

        if let Some(group) = group {
            group.cancel().await;
        }
        debug!(app = %self.app_id, sequence = self.sequence, "app monitor stopped");
    }

    /// Push the full status; `false` once nobody listens
    async fn publish(&self, status: AppStatus) -> bool {
        debug!(app = %self.app_id, state = %status.state(), "publishing status");
        self.status_tx.send(status).await.is_ok()
    }
}
