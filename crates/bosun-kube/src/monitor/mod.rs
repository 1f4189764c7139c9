//! App State Monitor
//!
//! A supervisor hierarchy of tasks talking over channels:
//!
//! - [`Monitor`]: one [`app::AppMonitorHandle`] per application id; a new
//!   sequence replaces the application's monitor
//! - `AppMonitor`: one live [`WatchGroup`] and the status board it feeds
//! - [`WatchGroup`]: one watch task per `(namespace, kind)`
//!
//! Every application's status goes out on one shared stream. Teardown is
//! explicit: replacing or removing an application aborts its monitor and
//! waits for it; [`MonitorHandle::shutdown`] does so for all of them.

mod app;
mod group;

pub use group::{WatchGroup, partition};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bosun_core::{AppStatus, KindAliases, StatusInformer, parse_informers};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{KubeError, Result};
use crate::registry::KindRegistry;
use app::AppMonitorHandle;

/// Buffered statuses between the monitor and its consumer
const STATUS_BUFFER: usize = 64;

enum Command {
    Apply {
        app_id: String,
        sequence: i64,
        informers: Vec<StatusInformer>,
    },
    Remove {
        app_id: String,
    },
}

/// Settings the monitor takes from [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub target_namespace: String,
    pub status_throttle: Duration,
    pub aliases: KindAliases,
}

impl From<&EngineConfig> for MonitorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            target_namespace: config.target_namespace.clone(),
            status_throttle: config.status_throttle,
            aliases: KindAliases::standard(),
        }
    }
}

/// Client side of a running [`Monitor`]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    target_namespace: String,
    aliases: KindAliases,
}

impl MonitorHandle {
    /// Watch `informers` for `app_id` at `sequence`
    ///
    /// Informers are `[namespace/]kind/name` strings; an invalid one rejects
    /// the whole list.
    pub async fn apply<S: AsRef<str>>(&self, app_id: &str, sequence: i64, informers: &[S]) -> Result<()> {
        let informers = parse_informers(informers, &self.target_namespace, &self.aliases)?;
        self.send(Command::Apply {
            app_id: app_id.to_string(),
            sequence,
            informers,
        })
        .await
    }

    /// Stop watching `app_id`
    pub async fn remove(&self, app_id: &str) -> Result<()> {
        self.send(Command::Remove {
            app_id: app_id.to_string(),
        })
        .await
    }

    /// Stop every application monitor and wait for all of them
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitor task failed");
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| KubeError::MonitorStopped)
    }
}

/// Supervisor of per-application monitors
pub struct Monitor {
    registry: Arc<KindRegistry>,
    throttle: Duration,
    status_tx: mpsc::Sender<AppStatus>,
    apps: HashMap<String, AppMonitorHandle>,
}

impl Monitor {
    /// Start the monitor
    ///
    /// The registry carries the cluster client its capabilities use.
    pub fn spawn(
        registry: Arc<KindRegistry>,
        config: impl Into<MonitorConfig>,
    ) -> (MonitorHandle, mpsc::Receiver<AppStatus>) {
        let config = config.into();
        let (status_tx, status_rx) = mpsc::channel(STATUS_BUFFER);
        let (tx, rx) = mpsc::channel(16);

        let monitor = Self {
            registry,
            throttle: config.status_throttle,
            status_tx,
            apps: HashMap::new(),
        };
        let task = tokio::spawn(monitor.run(rx));

        let handle = MonitorHandle {
            tx,
            task,
            target_namespace: config.target_namespace,
            aliases: config.aliases,
        };
        (handle, status_rx)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(kinds = ?self.registry.kinds(), "monitor started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Apply {
                    app_id,
                    sequence,
                    informers,
                } => self.apply(app_id, sequence, informers).await,
                Command::Remove { app_id } => {
                    if let Some(app) = self.apps.remove(&app_id) {
                        info!(app = %app_id, "removing app monitor");
                        app.stop().await;
                    }
                }
            }
        }

        for (app_id, app) in self.apps.drain() {
            debug!(app = %app_id, "stopping app monitor");
            app.stop().await;
        }
        info!("monitor stopped");
    }

    async fn apply(&mut self, app_id: String, sequence: i64, informers: Vec<StatusInformer>) {
        let current = match self.apps.remove(&app_id) {
            Some(app) if app.sequence() == sequence => Some(app),
            Some(app) => {
                info!(app = %app_id, from = app.sequence(), to = sequence, "sequence changed, replacing app monitor");
                app.stop().await;
                None
            }
            None => None,
        };

        let app = current.unwrap_or_else(|| {
            AppMonitorHandle::spawn(
                app_id.clone(),
                sequence,
                self.registry.clone(),
                self.throttle,
                self.status_tx.clone(),
            )
        });

        if !app.update(informers).await {
            warn!(app = %app_id, "app monitor is gone, dropping it");
            app.stop().await;
            return;
        }
        self.apps.insert(app_id, app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{KindCapability, StateSink};
    use async_trait::async_trait;
    use bosun_core::State;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports each watched object with a fixed sequence of states, then
    /// idles until aborted
    struct Scripted {
        kind: &'static str,
        states: Vec<State>,
        running: Arc<AtomicUsize>,
    }

    struct RunningGuard(Arc<AtomicUsize>);

    impl Drop for RunningGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KindCapability for Scripted {
        fn kind(&self) -> &str {
            self.kind
        }

        async fn state_of(&self, _namespace: &str, _name: &str) -> Result<Option<State>> {
            Ok(self.states.last().copied())
        }

        async fn watch(&self, _namespace: String, names: Vec<String>, sink: StateSink) {
            self.running.fetch_add(1, Ordering::SeqCst);
            let _guard = RunningGuard(self.running.clone());
            for state in &self.states {
                for name in &names {
                    if !sink.send(name, *state).await {
                        return;
                    }
                }
            }
            std::future::pending::<()>().await;
        }
    }

    fn setup(states: Vec<State>) -> (Arc<KindRegistry>, Arc<AtomicUsize>) {
        let running = Arc::new(AtomicUsize::new(0));
        let registry = KindRegistry::new().with(Scripted {
            kind: "deployment",
            states,
            running: running.clone(),
        });
        (Arc::new(registry), running)
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            target_namespace: "shop".to_string(),
            status_throttle: Duration::from_secs(1),
            aliases: KindAliases::standard(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_status_is_all_missing() {
        let (registry, _) = setup(vec![State::Ready]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["deploy/web", "svc/web"]).await.unwrap();

        let first = statuses.recv().await.unwrap();
        assert_eq!(first.app_id, "shop");
        assert_eq!(first.sequence, 1);
        assert_eq!(first.resource_states.len(), 2);
        assert!(first.resource_states.iter().all(|s| s.state == State::Missing));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_readings_are_throttled_and_merged() {
        let (registry, _) = setup(vec![State::Unavailable, State::Updating, State::Ready]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["deploy/web"]).await.unwrap();
        let first = statuses.recv().await.unwrap();
        assert_eq!(first.state(), State::Missing);

        let started = tokio::time::Instant::now();
        let second = statuses.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(999));
        assert_eq!(second.state(), State::Ready);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_worse_reading_keeps_best_state() {
        let (registry, _) = setup(vec![State::Ready, State::Degraded]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["deploy/web"]).await.unwrap();
        statuses.recv().await.unwrap();

        let live = statuses.recv().await.unwrap();
        assert_eq!(live.state(), State::Ready);

        // The degraded reading changed nothing, so nothing more is published
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(statuses.try_recv().is_err());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_kind_stays_missing() {
        let (registry, running) = setup(vec![State::Ready]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["cronjob/nightly"]).await.unwrap();
        let first = statuses.recv().await.unwrap();
        assert_eq!(first.state(), State::Missing);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(statuses.try_recv().is_err());
        assert_eq!(running.load(Ordering::SeqCst), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_sequence_replaces_watches() {
        let (registry, running) = setup(vec![State::Ready]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["deploy/web", "db/deploy/pg"]).await.unwrap();
        statuses.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(running.load(Ordering::SeqCst), 2);

        handle.apply("shop", 2, &["deploy/web"]).await.unwrap();
        let mut status = statuses.recv().await.unwrap();
        while status.sequence != 2 {
            status = statuses.recv().await.unwrap();
        }
        assert_eq!(status.resource_states.len(), 1);
        assert_eq!(status.state(), State::Missing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(running.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_stops_watches() {
        let (registry, running) = setup(vec![State::Ready]);
        let (handle, mut statuses) = Monitor::spawn(registry, config());

        handle.apply("shop", 1, &["deploy/web"]).await.unwrap();
        statuses.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(running.load(Ordering::SeqCst), 1);

        handle.remove("shop").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(running.load(Ordering::SeqCst), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_informer_is_rejected() {
        let (registry, _) = setup(vec![State::Ready]);
        let (handle, _statuses) = Monitor::spawn(registry, config());

        let err = handle.apply("shop", 1, &["sentry-web"]).await.unwrap_err();
        assert!(matches!(err, KubeError::InvalidConfig(_)));

        handle.shutdown().await;
    }
}
