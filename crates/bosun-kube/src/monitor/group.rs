//! Watch group: one watch task per (namespace, kind)

use std::collections::BTreeMap;

use bosun_core::{ResourceState, StatusInformer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::{KindRegistry, StateSink};

/// Informers split by the watch that serves them
pub fn partition(informers: &[StatusInformer]) -> BTreeMap<(String, String), Vec<String>> {
    let mut partitions: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for informer in informers {
        let names = partitions
            .entry((informer.namespace.clone(), informer.kind.clone()))
            .or_default();
        if !names.contains(&informer.name) {
            names.push(informer.name.clone());
        }
    }
    partitions
}

/// The live watch tasks of one application
///
/// Dropping the group aborts its tasks; [`WatchGroup::cancel`] also waits
/// for them to finish.
pub struct WatchGroup {
    /// `namespace/kind` of each task, for logging
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl WatchGroup {
    /// Start one task per partition, all feeding `tx`
    ///
    /// Kinds with no registered capability are logged and never report.
    pub fn start(registry: &KindRegistry, informers: &[StatusInformer], tx: mpsc::Sender<ResourceState>) -> Self {
        let mut tasks = Vec::new();

        for ((namespace, kind), names) in partition(informers) {
            let Some(capability) = registry.get(&kind) else {
                warn!(kind = %kind, namespace = %namespace, "unsupported kind, it will stay missing");
                continue;
            };

            debug!(kind = %kind, namespace = %namespace, objects = names.len(), "starting watch");
            let watch = format!("{}/{}", namespace, kind);
            let sink = StateSink::new(kind, namespace.clone(), tx.clone());
            let handle = tokio::spawn(async move { capability.watch(namespace, names, sink).await });
            tasks.push((watch, handle));
        }

        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task and wait for all of them to finish
    pub async fn cancel(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for (_, handle) in &tasks {
            handle.abort();
        }
        for (watch, handle) in tasks {
            match handle.await {
                Err(e) if !e.is_cancelled() => warn!(watch = %watch, error = %e, "watch task panicked"),
                _ => {}
            }
        }
    }
}

impl Drop for WatchGroup {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
