//! Hook Job cleanup
//!
//! Jobs annotated with a hook delete policy are removed once they finish:
//! `hook-succeeded` deletes a Job that completed, `hook-failed` one that
//! failed. This runs as a background watch, independent of any deploy.

use bosun_core::annotations::parse_hook_delete_policy;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{DeleteParams, PropagationPolicy};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a Job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// Outcome of a finished Job: no pods active and at least one pod succeeded
/// or failed
pub fn job_outcome(job: &Job) -> Option<JobOutcome> {
    let status = job.status.as_ref()?;
    if status.active.unwrap_or(0) > 0 {
        return None;
    }
    if status.succeeded.unwrap_or(0) > 0 {
        Some(JobOutcome::Succeeded)
    } else if status.failed.unwrap_or(0) > 0 {
        Some(JobOutcome::Failed)
    } else {
        None
    }
}

/// Whether a Job's delete policy asks for it to be removed now
pub fn should_clean_up(job: &Job) -> bool {
    let policy = parse_hook_delete_policy(job.annotations());
    if !policy.is_set() {
        return false;
    }
    match job_outcome(job) {
        Some(JobOutcome::Succeeded) => policy.on_success,
        Some(JobOutcome::Failed) => policy.on_failure,
        None => false,
    }
}

/// Background watch deleting finished hook Jobs
pub struct HookCleaner {
    client: Client,
}

impl HookCleaner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Start watching `namespace`, or every namespace when `None`
    ///
    /// Abort the returned handle to stop.
    pub fn spawn(self, namespace: Option<String>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(namespace).await })
    }

    async fn run(&self, namespace: Option<String>) {
        let api: Api<Job> = match &namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .applied_objects()
            .boxed();

        debug!(namespace = namespace.as_deref().unwrap_or("*"), "hook cleanup started");

        while let Some(event) = events.next().await {
            match event {
                Ok(job) if should_clean_up(&job) => self.delete(&job).await,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "hook job watch error"),
            }
        }
    }

    async fn delete(&self, job: &Job) {
        let name = job.name_any();
        let namespace = job.namespace().unwrap_or_default();
        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&name, &params).await {
            Ok(_) => info!(namespace = %namespace, job = %name, "deleted finished hook job"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => warn!(namespace = %namespace, job = %name, error = %e, "failed to delete hook job"),
        }
    }
}
