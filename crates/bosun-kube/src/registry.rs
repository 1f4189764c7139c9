//! Kind capability registry
//!
//! Each supported kind registers one [`KindCapability`]: a point read used by
//! the readiness waiter and a long-lived watch used by the status monitor.
//! The registry is an explicit table built once and shared by `Arc`; adding a
//! kind means registering one more capability.
//!
//! Typed kinds are served by [`TypedKind`], which pairs a `kube` watcher with
//! a periodic resync and a [`StateCalculator`].

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bosun_core::{ResourceState, State};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::health;

/// Where a watch task delivers its readings
#[derive(Debug, Clone)]
pub struct StateSink {
    kind: String,
    namespace: String,
    tx: mpsc::Sender<ResourceState>,
}

impl StateSink {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, tx: mpsc::Sender<ResourceState>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            tx,
        }
    }

    /// Deliver a reading; `false` once the receiver is gone
    pub async fn send(&self, name: &str, state: State) -> bool {
        let reading = ResourceState {
            kind: self.kind.clone(),
            name: name.to_string(),
            namespace: self.namespace.clone(),
            state,
        };
        self.tx.send(reading).await.is_ok()
    }
}

/// What the engine can do with one kind
#[async_trait]
pub trait KindCapability: Send + Sync {
    /// Canonical lowercase kind
    fn kind(&self) -> &str;

    /// Current state of one object; `None` when it does not exist
    async fn state_of(&self, namespace: &str, name: &str) -> Result<Option<State>>;

    /// Report the state of the named objects until the task is aborted or
    /// the sink closes
    async fn watch(&self, namespace: String, names: Vec<String>, sink: StateSink);
}

/// Computes a [`State`] for a typed object
///
/// Calculators are cloned per watch task, so per-object memory (such as the
/// DaemonSet generation tracker) is scoped to that task.
#[async_trait]
pub trait StateCalculator<K>: Clone + Send + Sync + 'static {
    async fn calculate(&mut self, client: &Client, obj: &K) -> State;
}

/// Capability for a typed, namespaced kind
pub struct TypedKind<K, C> {
    kind: &'static str,
    client: Client,
    resync: Duration,
    calculator: C,
    _marker: std::marker::PhantomData<fn() -> K>,
}

impl<K, C> TypedKind<K, C> {
    pub fn new(kind: &'static str, client: Client, resync: Duration, calculator: C) -> Self {
        Self {
            kind,
            client,
            resync,
            calculator,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<K, C> KindCapability for TypedKind<K, C>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    C: StateCalculator<K>,
{
    fn kind(&self) -> &str {
        self.kind
    }

    async fn state_of(&self, namespace: &str, name: &str) -> Result<Option<State>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(obj) => {
                let mut calculator = self.calculator.clone();
                Ok(Some(calculator.calculate(&self.client, &obj).await))
            }
            None => Ok(None),
        }
    }

    async fn watch(&self, namespace: String, names: Vec<String>, sink: StateSink) {
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let wanted: HashSet<String> = names.into_iter().collect();
        let mut calculator = self.calculator.clone();

        let mut events = watcher(api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut resync = interval_at(Instant::now() + self.resync, self.resync);

        debug!(kind = self.kind, namespace = %namespace, objects = wanted.len(), "watch started");

        loop {
            tokio::select! {
                event = events.next() => {
                    let delivered = match event {
                        Some(Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj))) => {
                            let name = obj.name_any();
                            if !wanted.contains(&name) {
                                continue;
                            }
                            let state = calculator.calculate(&self.client, &obj).await;
                            sink.send(&name, state).await
                        }
                        Some(Ok(watcher::Event::Delete(obj))) => {
                            let name = obj.name_any();
                            if !wanted.contains(&name) {
                                continue;
                            }
                            sink.send(&name, State::Missing).await
                        }
                        Some(Ok(watcher::Event::Init | watcher::Event::InitDone)) => true,
                        Some(Err(e)) => {
                            warn!(kind = self.kind, namespace = %namespace, error = %e, "watch error");
                            true
                        }
                        None => break,
                    };
                    if !delivered {
                        break;
                    }
                }
                _ = resync.tick() => {
                    for name in &wanted {
                        let state = match api.get_opt(name).await {
                            Ok(Some(obj)) => calculator.calculate(&self.client, &obj).await,
                            Ok(None) => State::Missing,
                            Err(e) => {
                                warn!(kind = self.kind, namespace = %namespace, name = %name, error = %e, "resync failed");
                                continue;
                            }
                        };
                        if !sink.send(name, state).await {
                            return;
                        }
                    }
                }
            }
        }

        debug!(kind = self.kind, namespace = %namespace, "watch ended");
    }
}

// ========== Calculators ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentCalculator;

#[async_trait]
impl StateCalculator<Deployment> for DeploymentCalculator {
    async fn calculate(&mut self, _client: &Client, obj: &Deployment) -> State {
        health::deployment_state(obj)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatefulSetCalculator;

#[async_trait]
impl StateCalculator<StatefulSet> for StatefulSetCalculator {
    async fn calculate(&mut self, _client: &Client, obj: &StatefulSet) -> State {
        health::statefulset_state(obj)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaemonSetCalculator {
    tracker: health::GenerationTracker,
}

#[async_trait]
impl StateCalculator<DaemonSet> for DaemonSetCalculator {
    async fn calculate(&mut self, _client: &Client, obj: &DaemonSet) -> State {
        health::daemonset_state(obj, &mut self.tracker)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PvcCalculator;

#[async_trait]
impl StateCalculator<PersistentVolumeClaim> for PvcCalculator {
    async fn calculate(&mut self, _client: &Client, obj: &PersistentVolumeClaim) -> State {
        health::pvc_state(obj)
    }
}

/// Service state needs the Service's Endpoints
async fn service_state_by_name(client: &Client, namespace: &str, name: &str) -> State {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    match services.get_opt(name).await {
        Ok(Some(service)) => service_state_with_endpoints(client, &service).await,
        Ok(None) => State::Missing,
        Err(e) => {
            warn!(namespace, name, error = %e, "failed to get service");
            State::Unavailable
        }
    }
}

async fn service_state_with_endpoints(client: &Client, service: &Service) -> State {
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();
    let endpoints: Api<Endpoints> = Api::namespaced(client.clone(), &namespace);

    let found = match endpoints.get_opt(&name).await {
        Ok(found) => found,
        Err(e) => {
            warn!(namespace = %namespace, name = %name, error = %e, "failed to get endpoints");
            None
        }
    };
    health::service_state(service, found.as_ref())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceCalculator;

#[async_trait]
impl StateCalculator<Service> for ServiceCalculator {
    async fn calculate(&mut self, client: &Client, obj: &Service) -> State {
        service_state_with_endpoints(client, obj).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngressCalculator;

#[async_trait]
impl StateCalculator<Ingress> for IngressCalculator {
    async fn calculate(&mut self, client: &Client, obj: &Ingress) -> State {
        let namespace = obj.namespace().unwrap_or_default();
        let mut backends = Vec::new();
        for service in health::ingress_backend_services(obj) {
            backends.push(service_state_by_name(client, &namespace, &service).await);
        }
        health::ingress_state(obj, &backends)
    }
}

// ========== Registry ==========

/// Kind name to capability table
#[derive(Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, Arc<dyn KindCapability>>,
}

impl KindRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds
    ///
    /// Service and Ingress health depends on Endpoints, which do not bump
    /// the watched object's resource version, so they resync faster.
    pub fn standard(client: Client, config: &EngineConfig) -> Self {
        let slow = config.watch_resync;
        let fast = config.endpoint_resync;

        Self::new()
            .with(TypedKind::<Deployment, _>::new(
                "deployment",
                client.clone(),
                slow,
                DeploymentCalculator,
            ))
            .with(TypedKind::<StatefulSet, _>::new(
                "statefulset",
                client.clone(),
                slow,
                StatefulSetCalculator,
            ))
            .with(TypedKind::<DaemonSet, _>::new(
                "daemonset",
                client.clone(),
                slow,
                DaemonSetCalculator::default(),
            ))
            .with(TypedKind::<Service, _>::new(
                "service",
                client.clone(),
                fast,
                ServiceCalculator,
            ))
            .with(TypedKind::<Ingress, _>::new(
                "ingress",
                client.clone(),
                fast,
                IngressCalculator,
            ))
            .with(TypedKind::<PersistentVolumeClaim, _>::new(
                "persistentvolumeclaim",
                client,
                slow,
                PvcCalculator,
            ))
    }

    /// Register a capability (replacing any previous one for the kind)
    pub fn with(mut self, capability: impl KindCapability + 'static) -> Self {
        self.register(Arc::new(capability));
        self
    }

    pub fn register(&mut self, capability: Arc<dyn KindCapability>) {
        self.kinds.insert(capability.kind().to_lowercase(), capability);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn KindCapability>> {
        self.kinds.get(&kind.to_lowercase()).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort();
        kinds
    }
}
