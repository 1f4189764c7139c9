//! Deployment executor
//!
//! A deploy walks a fixed sequence of phases:
//!
//! ```text
//! Diff -> PlanDeletions -> Delete -> PlanCreations -> [DryRun] -> Apply -> [WaitReady/WaitProperty]
//! ```
//!
//! Everything runs sequentially: phases one after the other, resources in
//! plan order, waits inline. A failing step ends the deploy with a
//! [`DeployResult`] carrying the phase and the captured output; it is not an
//! `Err`, since the caller records a failed attempt and retries a later
//! sequence. Every phase entered is listed in [`DeployResult::phases`].

use std::fmt;
use std::sync::Arc;

use bosun_core::annotations::{parse_wait_for_properties, wants_wait_for_ready};
use bosun_core::{
    DiffOptions, KindOrder, Plan, Planner, Resource, compute_deletions, parse_manifests,
    should_dry_run,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::applier::{Applier, ApplyRequest, CommandFailure, CommandOutput, RemoveRequest};
use crate::config::EngineConfig;
use crate::namespaces::NamespaceClearer;
use crate::tracker::DeployTracker;
use crate::waiter::ResourceWaiter;

/// Kind whose deletion never blocks
const PVC_KIND: &str = "PersistentVolumeClaim";

/// Step of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployPhase {
    Diff,
    PlanDeletions,
    Delete,
    PlanCreations,
    DryRun,
    Apply,
    WaitReady,
    WaitProperty,
    ClearNamespaces,
    Complete,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployPhase::Diff => "diff",
            DeployPhase::PlanDeletions => "plan-deletions",
            DeployPhase::Delete => "delete",
            DeployPhase::PlanCreations => "plan-creations",
            DeployPhase::DryRun => "dry-run",
            DeployPhase::Apply => "apply",
            DeployPhase::WaitReady => "wait-ready",
            DeployPhase::WaitProperty => "wait-property",
            DeployPhase::ClearNamespaces => "clear-namespaces",
            DeployPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// What to deploy
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub app_id: &'a str,
    pub sequence: i64,
    /// Slug stamped onto applied objects when slug annotation is enabled
    pub owner_slug: &'a str,
    /// Manifests of the previously deployed sequence (empty on first deploy)
    pub previous_manifests: &'a str,
    pub manifests: &'a str,
}

/// What to remove
#[derive(Debug, Clone, Copy)]
pub struct UndeployRequest<'a> {
    pub app_id: &'a str,
    pub previous_manifests: &'a str,
    /// Namespaces to empty once the manifests are gone
    pub clear_namespaces: &'a [String],
}

/// Outcome of a deploy or undeploy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub app_id: String,
    pub sequence: i64,
    /// Phase reached; the failing phase when `succeeded` is false
    pub phase: DeployPhase,
    /// Phases entered, in order
    pub phases: Vec<DeployPhase>,
    pub succeeded: bool,
    /// Output captured from every applier call
    pub output: CommandOutput,
    pub error: Option<String>,
    /// `Kind/name` of the resource that failed
    pub failed_resource: Option<String>,
    pub deleted: Vec<String>,
    pub applied: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DeployResult {
    fn start(app_id: &str, sequence: i64) -> Self {
        let now = Utc::now();
        Self {
            app_id: app_id.to_string(),
            sequence,
            phase: DeployPhase::Diff,
            phases: vec![DeployPhase::Diff],
            succeeded: false,
            output: CommandOutput::default(),
            error: None,
            failed_resource: None,
            deleted: Vec::new(),
            applied: Vec::new(),
            started_at: now,
            completed_at: now,
        }
    }

    fn enter(&mut self, phase: DeployPhase) {
        if self.phase != phase {
            debug!(app = %self.app_id, sequence = self.sequence, from = %self.phase, to = %phase, "phase");
            self.phase = phase;
            self.phases.push(phase);
        }
    }

    fn fail(mut self, error: impl Into<String>, resource: Option<&Resource>) -> Self {
        self.error = Some(error.into());
        self.failed_resource = resource.map(Resource::key);
        self.completed_at = Utc::now();
        error!(
            app = %self.app_id,
            sequence = self.sequence,
            phase = %self.phase,
            resource = self.failed_resource.as_deref().unwrap_or_default(),
            error = self.error.as_deref().unwrap_or_default(),
            "deploy failed"
        );
        self
    }

    fn complete(mut self) -> Self {
        self.enter(DeployPhase::Complete);
        self.succeeded = true;
        self.completed_at = Utc::now();
        self
    }

    /// Elapsed time
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at.signed_duration_since(self.started_at)
    }
}

/// Executes deploys and undeploys for one cluster
pub struct Executor<A, W> {
    applier: A,
    waiter: W,
    order: KindOrder,
    diff_options: DiffOptions,
    dry_run: bool,
    annotate_slug: bool,
    tracker: Option<Arc<DeployTracker>>,
    clearer: Option<Arc<dyn NamespaceClearer>>,
}

impl<A: Applier, W: ResourceWaiter> Executor<A, W> {
    pub fn new(applier: A, waiter: W, config: &EngineConfig) -> Self {
        Self {
            applier,
            waiter,
            order: config.kind_order(),
            diff_options: config.diff_options(),
            dry_run: config.dry_run,
            annotate_slug: config.annotate_slug,
            tracker: None,
            clearer: None,
        }
    }

    /// Record successful deploys in a shared tracker
    pub fn with_tracker(mut self, tracker: Arc<DeployTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Enable namespace clearing on undeploy
    pub fn with_clearer(mut self, clearer: Arc<dyn NamespaceClearer>) -> Self {
        self.clearer = Some(clearer);
        self
    }

    fn namespace(&self) -> &str {
        &self.diff_options.target_namespace
    }

    /// Deploy `request.manifests`, removing what the previous sequence had
    /// and the new one does not
    pub async fn deploy(&self, request: DeployRequest<'_>) -> DeployResult {
        let mut result = DeployResult::start(request.app_id, request.sequence);
        info!(app = %request.app_id, sequence = request.sequence, "deploying");

        let previous = parse_manifests(request.previous_manifests);
        let current = parse_manifests(request.manifests);
        let removed = compute_deletions(&previous, &current, &self.diff_options);

        result.enter(DeployPhase::PlanDeletions);
        let deletions = Planner::new(&self.order).plan_for_deletion_with_crds(removed);
        debug!(app = %request.app_id, count = deletions.len(), "planned deletions");

        result.enter(DeployPhase::Delete);
        if let Err((failure, resource)) = self.delete_plan(&deletions, &mut result).await {
            return result.fail(failure.message, Some(&resource));
        }

        result.enter(DeployPhase::PlanCreations);
        let creations = Planner::new(&self.order).plan_for_creation(current);
        debug!(app = %request.app_id, count = creations.len(), "planned creations");

        if self.dry_run {
            if should_dry_run(creations.resources()) {
                result.enter(DeployPhase::DryRun);
                if let Err((failure, resource)) = self
                    .apply_plan(&creations, request.owner_slug, true, &mut result)
                    .await
                {
                    return result.fail(failure.message, Some(&resource));
                }
                result.applied.clear();
            } else {
                debug!(app = %request.app_id, "batch defines types or namespaces, skipping dry run");
            }
        }

        result.enter(DeployPhase::Apply);
        for resource in creations.resources() {
            if let Err(failure) = self.apply_one(resource, request.owner_slug, false, &mut result).await {
                return result.fail(failure.message, Some(resource));
            }
            if let Err(message) = self.post_apply(resource, &mut result).await {
                return result.fail(message, Some(resource));
            }
        }

        if let Some(tracker) = &self.tracker {
            tracker.record(request.app_id, request.sequence);
        }
        info!(
            app = %request.app_id,
            sequence = request.sequence,
            applied = result.applied.len(),
            deleted = result.deleted.len(),
            "deploy complete"
        );
        result.complete()
    }

    /// Delete everything from a previous deploy, then clear namespaces
    pub async fn undeploy(&self, request: UndeployRequest<'_>) -> DeployResult {
        let mut result = DeployResult::start(request.app_id, 0);
        info!(app = %request.app_id, "undeploying");

        let previous = parse_manifests(request.previous_manifests);
        let removed = compute_deletions(&previous, &[], &self.diff_options);

        result.enter(DeployPhase::PlanDeletions);
        let deletions = Planner::new(&self.order).plan_for_deletion_with_crds(removed);

        result.enter(DeployPhase::Delete);
        if let Err((failure, resource)) = self.delete_plan(&deletions, &mut result).await {
            return result.fail(failure.message, Some(&resource));
        }

        if !request.clear_namespaces.is_empty() {
            result.enter(DeployPhase::ClearNamespaces);
            match &self.clearer {
                Some(clearer) => {
                    let selector = self.diff_options.restore_selector.as_ref();
                    for namespace in request.clear_namespaces {
                        let count = clearer.clear(namespace, selector).await;
                        debug!(namespace = %namespace, count, "cleared");
                    }
                }
                None => warn!(app = %request.app_id, "no namespace clearer configured, skipping"),
            }
        }

        if let Some(tracker) = &self.tracker {
            tracker.forget(request.app_id);
        }
        info!(app = %request.app_id, deleted = result.deleted.len(), "undeploy complete");
        result.complete()
    }

    async fn delete_plan(
        &self,
        plan: &Plan,
        result: &mut DeployResult,
    ) -> Result<(), (CommandFailure, Resource)> {
        for resource in plan.resources() {
            let wait = resource.kind() != PVC_KIND;
            debug!(resource = %resource.key(), wait, "deleting");

            let outcome = self
                .applier
                .remove(RemoveRequest {
                    namespace: resource.namespace().unwrap_or(self.namespace()),
                    manifest: &resource.raw,
                    wait,
                })
                .await;

            match outcome {
                Ok(output) => {
                    result.output.extend(output);
                    result.deleted.push(resource.key());
                }
                Err(mut failure) => {
                    result.output.extend(std::mem::take(&mut failure.output));
                    return Err((failure, resource.clone()));
                }
            }
        }
        Ok(())
    }

    async fn apply_plan(
        &self,
        plan: &Plan,
        owner_slug: &str,
        dry_run: bool,
        result: &mut DeployResult,
    ) -> Result<(), (CommandFailure, Resource)> {
        for resource in plan.resources() {
            self.apply_one(resource, owner_slug, dry_run, result)
                .await
                .map_err(|failure| (failure, resource.clone()))?;
        }
        Ok(())
    }

    async fn apply_one(
        &self,
        resource: &Resource,
        owner_slug: &str,
        dry_run: bool,
        result: &mut DeployResult,
    ) -> Result<(), CommandFailure> {
        debug!(resource = %resource.key(), dry_run, "applying");
        let outcome = self
            .applier
            .apply(ApplyRequest {
                namespace: resource.namespace().unwrap_or(self.namespace()),
                owner_slug,
                manifest: &resource.raw,
                dry_run,
                wait: false,
                annotate_slug: self.annotate_slug,
            })
            .await;

        match outcome {
            Ok(output) => {
                result.output.extend(output);
                result.applied.push(resource.key());
                Ok(())
            }
            Err(mut failure) => {
                result.output.extend(std::mem::take(&mut failure.output));
                Err(failure)
            }
        }
    }

    /// Annotation-driven waits on an applied resource
    async fn post_apply(&self, resource: &Resource, result: &mut DeployResult) -> Result<(), String> {
        let annotations = resource.annotations();

        if wants_wait_for_ready(annotations) {
            result.enter(DeployPhase::WaitReady);
            info!(resource = %resource.key(), "waiting for ready");
            self.waiter
                .wait_for_ready(resource, self.namespace())
                .await
                .map_err(|e| e.to_string())?;
        }

        let properties = parse_wait_for_properties(annotations).map_err(|e| {
            result.enter(DeployPhase::WaitProperty);
            e.to_string()
        })?;
        for property in properties {
            result.enter(DeployPhase::WaitProperty);
            info!(resource = %resource.key(), path = %property.path, value = %property.value, "waiting for property");
            self.waiter
                .wait_for_property(resource, self.namespace(), &property.path, &property.value)
                .await
                .map_err(|e| e.to_string())?;
        }

        result.enter(DeployPhase::Apply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::ApplyOutcome;
    use crate::error::{KubeError, Result};
    use async_trait::async_trait;
    use bosun_core::PropertyPath;
    use std::sync::Mutex;

    /// Records every call as "verb Kind/name"
    #[derive(Default)]
    struct FakeApplier {
        calls: Mutex<Vec<String>>,
        waits: Mutex<Vec<(String, bool)>>,
        fail_on: Option<String>,
    }

    impl FakeApplier {
        fn failing(call: &str) -> Self {
            Self {
                fail_on: Some(call.to_string()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, verb: &str, manifest: &str) -> ApplyOutcome {
            let key = Resource::decode(manifest).key();
            let call = format!("{} {}", verb, key);
            self.calls.lock().unwrap().push(call.clone());
            let output = CommandOutput {
                stdout: format!("{}\n", call),
                stderr: String::new(),
            };
            if self.fail_on.as_deref() == Some(call.as_str()) {
                Err(CommandFailure::new(format!("{} failed", call), output))
            } else {
                Ok(output)
            }
        }
    }

    #[async_trait]
    impl Applier for FakeApplier {
        async fn apply(&self, request: ApplyRequest<'_>) -> ApplyOutcome {
            let verb = if request.dry_run { "dry-run" } else { "apply" };
            self.record(verb, request.manifest)
        }

        async fn remove(&self, request: RemoveRequest<'_>) -> ApplyOutcome {
            let key = Resource::decode(request.manifest).key();
            self.waits.lock().unwrap().push((key, request.wait));
            self.record("delete", request.manifest)
        }
    }

    #[derive(Default)]
    struct FakeWaiter {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceWaiter for FakeWaiter {
        async fn wait_for_ready(&self, resource: &Resource, _namespace: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("ready {}", resource.key()));
            Ok(())
        }

        async fn wait_for_property(
            &self,
            resource: &Resource,
            _namespace: &str,
            path: &str,
            expected: &str,
        ) -> Result<()> {
            PropertyPath::parse(path).map_err(KubeError::from)?;
            self.calls
                .lock()
                .unwrap()
                .push(format!("property {} {}={}", resource.key(), path, expected));
            Ok(())
        }
    }

    fn config(dry_run: bool) -> EngineConfig {
        EngineConfig {
            target_namespace: "shop".to_string(),
            dry_run,
            ..Default::default()
        }
    }

    fn doc(kind: &str, name: &str) -> String {
        let api_version = match kind {
            "Deployment" => "apps/v1",
            "Ingress" => "networking.k8s.io/v1",
            "CustomResourceDefinition" => "apiextensions.k8s.io/v1",
            _ => "v1",
        };
        format!(
            "apiVersion: {}\nkind: {}\nmetadata:\n  name: {}\n",
            api_version, kind, name
        )
    }

    fn join(docs: &[String]) -> String {
        docs.join("---\n")
    }

    #[tokio::test]
    async fn test_deploy_orders_deletes_then_applies() {
        let previous = join(&[doc("ConfigMap", "old"), doc("Service", "web"), doc("Ingress", "old")]);
        let current = join(&[doc("Ingress", "web"), doc("Service", "web"), doc("Namespace", "shop")]);

        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false));
        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 2,
                owner_slug: "shop",
                previous_manifests: &previous,
                manifests: &current,
            })
            .await;

        assert!(result.succeeded, "{:?}", result.error);
        assert_eq!(result.phase, DeployPhase::Complete);
        assert_eq!(
            applier.calls(),
            vec![
                "delete Ingress/old",
                "delete ConfigMap/old",
                "apply Namespace/shop",
                "apply Service/web",
                "apply Ingress/web",
            ]
        );
        assert_eq!(result.deleted, vec!["Ingress/old", "ConfigMap/old"]);
        assert!(result.output.stdout.contains("apply Ingress/web"));
        assert_eq!(
            result.phases,
            vec![
                DeployPhase::Diff,
                DeployPhase::PlanDeletions,
                DeployPhase::Delete,
                DeployPhase::PlanCreations,
                DeployPhase::Apply,
                DeployPhase::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_delete_reports_phases_entered() {
        let previous = join(&[doc("ConfigMap", "old"), doc("Service", "web")]);
        let current = doc("Service", "web");
        let applier = Arc::new(FakeApplier::failing("delete ConfigMap/old"));
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 2,
                owner_slug: "shop",
                previous_manifests: &previous,
                manifests: &current,
            })
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.phase, DeployPhase::Delete);
        assert_eq!(
            result.phases,
            vec![DeployPhase::Diff, DeployPhase::PlanDeletions, DeployPhase::Delete]
        );
        assert_eq!(applier.calls(), vec!["delete ConfigMap/old"]);
    }

    #[tokio::test]
    async fn test_dry_run_precedes_apply() {
        let current = join(&[doc("ConfigMap", "cfg"), doc("Service", "web")]);
        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(true));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 1,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: &current,
            })
            .await;

        assert!(result.succeeded);
        assert_eq!(
            applier.calls(),
            vec![
                "dry-run ConfigMap/cfg",
                "dry-run Service/web",
                "apply ConfigMap/cfg",
                "apply Service/web",
            ]
        );
        assert_eq!(result.applied, vec!["ConfigMap/cfg", "Service/web"]);
    }

    #[tokio::test]
    async fn test_dry_run_skipped_for_crds() {
        let current = join(&[doc("CustomResourceDefinition", "widgets.example.com"), doc("ConfigMap", "cfg")]);
        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(true));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 1,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: &current,
            })
            .await;

        assert!(result.succeeded);
        assert!(applier.calls().iter().all(|c| !c.starts_with("dry-run")));
    }

    #[tokio::test]
    async fn test_dry_run_failure_aborts_before_apply() {
        let current = join(&[doc("ConfigMap", "cfg"), doc("Service", "web")]);
        let applier = Arc::new(FakeApplier::failing("dry-run Service/web"));
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(true));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 1,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: &current,
            })
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.phase, DeployPhase::DryRun);
        assert_eq!(result.failed_resource.as_deref(), Some("Service/web"));
        assert!(applier.calls().iter().all(|c| !c.starts_with("apply")));
        assert!(result.output.stdout.contains("dry-run Service/web"));
    }

    #[tokio::test]
    async fn test_apply_failure_keeps_partial_output() {
        let current = join(&[doc("ConfigMap", "cfg"), doc("Service", "web"), doc("Ingress", "web")]);
        let applier = Arc::new(FakeApplier::failing("apply Service/web"));
        let tracker = Arc::new(DeployTracker::new());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false))
            .with_tracker(tracker.clone());

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 3,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: &current,
            })
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.phase, DeployPhase::Apply);
        assert_eq!(result.output.stdout, "apply ConfigMap/cfg\napply Service/web\n");
        assert_eq!(applier.calls().len(), 2);
        assert_eq!(tracker.last("shop"), None);
    }

    #[tokio::test]
    async fn test_pvc_deletion_never_waits() {
        let previous = join(&[doc("PersistentVolumeClaim", "data"), doc("ConfigMap", "cfg")]);
        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false));

        executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 2,
                owner_slug: "shop",
                previous_manifests: &previous,
                manifests: "",
            })
            .await;

        let waits = applier.waits.lock().unwrap().clone();
        assert!(waits.contains(&("PersistentVolumeClaim/data".to_string(), false)));
        assert!(waits.contains(&("ConfigMap/cfg".to_string(), true)));
    }

    #[tokio::test]
    async fn test_waits_run_in_listed_order() {
        let current = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  annotations:\n    bosun.io/wait-for-ready: \"true\"\n    bosun.io/wait-for-properties: \".status.phase=Ready,.status.replicas=2\"\n";
        let applier = Arc::new(FakeApplier::default());
        let waiter = FakeWaiter::default();
        let executor = Executor::new(applier.clone(), waiter, &config(false));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 1,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: current,
            })
            .await;

        assert!(result.succeeded);
        assert_eq!(
            executor.waiter.calls.lock().unwrap().clone(),
            vec![
                "ready Deployment/web",
                "property Deployment/web .status.phase=Ready",
                "property Deployment/web .status.replicas=2",
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_property_path_fails_deploy() {
        let current = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  annotations:\n    bosun.io/wait-for-properties: \".status..phase=Ready\"\n";
        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false));

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 1,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: current,
            })
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.phase, DeployPhase::WaitProperty);
        assert_eq!(result.failed_resource.as_deref(), Some("ConfigMap/cfg"));
    }

    #[tokio::test]
    async fn test_successful_deploy_is_tracked() {
        let tracker = Arc::new(DeployTracker::new());
        let applier = Arc::new(FakeApplier::default());
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false))
            .with_tracker(tracker.clone());

        let result = executor
            .deploy(DeployRequest {
                app_id: "shop",
                sequence: 7,
                owner_slug: "shop",
                previous_manifests: "",
                manifests: &doc("ConfigMap", "cfg"),
            })
            .await;

        assert!(result.succeeded);
        assert!(!tracker.should_deploy("shop", 7));
    }

    struct CountingClearer {
        cleared: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NamespaceClearer for CountingClearer {
        async fn clear(
            &self,
            namespace: &str,
            _selector: Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector>,
        ) -> usize {
            self.cleared.lock().unwrap().push(namespace.to_string());
            0
        }
    }

    #[tokio::test]
    async fn test_undeploy_deletes_and_clears() {
        let previous = join(&[
            doc("Namespace", "shop"),
            doc("Deployment", "web"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: kept\n  annotations:\n    bosun.io/keep: \"true\"\n".to_string(),
        ]);
        let applier = Arc::new(FakeApplier::default());
        let clearer = Arc::new(CountingClearer {
            cleared: Mutex::new(Vec::new()),
        });
        let executor = Executor::new(applier.clone(), FakeWaiter::default(), &config(false))
            .with_clearer(clearer.clone());

        let result = executor
            .undeploy(UndeployRequest {
                app_id: "shop",
                previous_manifests: &previous,
                clear_namespaces: &["shop-data".to_string()],
            })
            .await;

        assert!(result.succeeded);
        assert_eq!(applier.calls(), vec!["delete Deployment/web", "delete Namespace/shop"]);
        assert_eq!(clearer.cleared.lock().unwrap().clone(), vec!["shop-data"]);
    }
}
