//! Per-kind health calculation
//!
//! Key features:
//! - Pure functions from a typed object (plus the objects it depends on) to a [`State`]
//! - Rollouts report `Updating`, partial availability `Degraded`, nothing serving `Unavailable`
//! - DaemonSet generation tracking scoped per object
//!
//! Deployments and StatefulSets are checked like a careful `--wait`: every
//! replica must be updated, ready and available before the object is `Ready`.

use std::collections::HashMap;

use bosun_core::State;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;

// ========== Workloads ==========

/// Replica counts shared by the workload calculators
#[derive(Debug, Clone, Copy, Default)]
struct Replicas {
    desired: i32,
    ready: i32,
    updated: i32,
    available: i32,
}

fn workload_state(replicas: Replicas, rolling: bool) -> State {
    if replicas.desired == 0 {
        return State::Ready;
    }
    if replicas.ready == 0 && replicas.available == 0 {
        return State::Unavailable;
    }
    if rolling || replicas.updated < replicas.desired {
        return State::Updating;
    }
    if replicas.ready < replicas.desired || replicas.available < replicas.desired {
        return State::Degraded;
    }
    State::Ready
}

fn generation_lags(generation: Option<i64>, observed: Option<i64>) -> bool {
    match (generation, observed) {
        (Some(generation), Some(observed)) => observed < generation,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Deployment health
///
/// A Deployment is `Ready` when all replicas are updated, ready and available
/// and the controller has observed the latest generation.
pub fn deployment_state(deployment: &Deployment) -> State {
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();

    let replicas = Replicas {
        desired: spec.and_then(|s| s.replicas).unwrap_or(1),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
    };
    let rolling = generation_lags(
        deployment.metadata.generation,
        status.and_then(|s| s.observed_generation),
    );

    workload_state(replicas, rolling)
}

/// StatefulSet health
///
/// Besides the replica counts, the current revision must match the update
/// revision (rollout complete).
pub fn statefulset_state(sts: &StatefulSet) -> State {
    let spec = sts.spec.as_ref();
    let status = sts.status.as_ref();

    let replicas = Replicas {
        desired: spec.and_then(|s| s.replicas).unwrap_or(1),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
    };
    let current_rev = status.and_then(|s| s.current_revision.as_ref());
    let update_rev = status.and_then(|s| s.update_revision.as_ref());
    let rolling = current_rev != update_rev
        || generation_lags(sts.metadata.generation, status.and_then(|s| s.observed_generation));

    workload_state(replicas, rolling)
}

/// Last generation at which each DaemonSet was fully rolled out
///
/// Keyed by `(namespace, name)`; one tracker belongs to one watch task.
#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    settled: HashMap<(String, String), i64>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn settled_at(&self, key: &(String, String)) -> Option<i64> {
        self.settled.get(key).copied()
    }
}

/// DaemonSet health
///
/// After a generation change the DaemonSet reports `Updating` until every
/// scheduled pod is updated and ready again.
pub fn daemonset_state(ds: &DaemonSet, tracker: &mut GenerationTracker) -> State {
    let status = ds.status.as_ref();
    let key = (
        ds.metadata.namespace.clone().unwrap_or_default(),
        ds.metadata.name.clone().unwrap_or_default(),
    );
    let generation = ds.metadata.generation.unwrap_or(0);

    let desired = status.map(|s| s.desired_number_scheduled).unwrap_or(0);
    let ready = status.map(|s| s.number_ready).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_number_scheduled).unwrap_or(0);
    let available = status.and_then(|s| s.number_available).unwrap_or(0);
    let lagging = generation_lags(ds.metadata.generation, status.and_then(|s| s.observed_generation));

    let settled = !lagging && updated >= desired && ready >= desired && available >= desired;
    if settled {
        tracker.settled.insert(key, generation);
        return State::Ready;
    }

    if ready == 0 {
        return State::Unavailable;
    }

    let changed = tracker
        .settled_at(&key)
        .is_some_and(|settled_gen| settled_gen != generation);
    if lagging || changed || updated < desired {
        return State::Updating;
    }

    State::Degraded
}

// ========== Network ==========

/// Service health from the Service and its Endpoints
///
/// - ExternalName services and selector-less services are `Ready`
/// - a LoadBalancer without an assigned ingress is `Unavailable`
/// - otherwise: no ready endpoint addresses is `Unavailable`, some not-ready
///   addresses is `Degraded`
pub fn service_state(service: &Service, endpoints: Option<&Endpoints>) -> State {
    let spec = service.spec.as_ref();
    let service_type = spec.and_then(|s| s.type_.as_deref()).unwrap_or("ClusterIP");

    if service_type == "ExternalName" {
        return State::Ready;
    }

    if service_type == "LoadBalancer" {
        let has_ingress = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|ingress| !ingress.is_empty());
        if !has_ingress {
            return State::Unavailable;
        }
    }

    let has_selector = spec
        .and_then(|s| s.selector.as_ref())
        .is_some_and(|selector| !selector.is_empty());
    if !has_selector {
        return State::Ready;
    }

    let (ready, not_ready) = endpoints
        .and_then(|e| e.subsets.as_ref())
        .map(|subsets| {
            subsets.iter().fold((0usize, 0usize), |(ready, not_ready), subset| {
                (
                    ready + subset.addresses.as_ref().map_or(0, Vec::len),
                    not_ready + subset.not_ready_addresses.as_ref().map_or(0, Vec::len),
                )
            })
        })
        .unwrap_or((0, 0));

    match (ready, not_ready) {
        (0, _) => State::Unavailable,
        (_, 0) => State::Ready,
        _ => State::Degraded,
    }
}

/// Names of the Services an Ingress routes to
pub fn ingress_backend_services(ingress: &Ingress) -> Vec<String> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };

    let default_backend = spec
        .default_backend
        .as_ref()
        .and_then(|b| b.service.as_ref())
        .map(|s| s.name.clone());

    let rule_backends = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .filter_map(|path| path.backend.service.as_ref())
        .map(|s| s.name.clone());

    let mut names: Vec<String> = default_backend.into_iter().chain(rule_backends).collect();
    names.sort();
    names.dedup();
    names
}

/// Ingress health
///
/// `Unavailable` until the controller assigns an address; then the worst of
/// the backend Service states.
pub fn ingress_state(ingress: &Ingress, backend_states: &[State]) -> State {
    let has_address = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|ingress| !ingress.is_empty());

    if !has_address {
        return State::Unavailable;
    }

    bosun_core::min_state(std::iter::once(State::Ready).chain(backend_states.iter().copied()))
}

// ========== Storage ==========

/// PersistentVolumeClaim health: `Ready` once bound
pub fn pvc_state(pvc: &PersistentVolumeClaim) -> State {
    match pvc.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Bound") => State::Ready,
        _ => State::Unavailable,
    }
}
