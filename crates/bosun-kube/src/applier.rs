//! Appliers: the boundary where manifests reach the cluster
//!
//! The executor only needs to know whether an apply or delete worked and
//! what it printed. Two implementations are provided:
//!
//! - [`KubectlApplier`]: shells out to `kubectl apply/delete -f -`
//! - [`ServerSideApplier`]: in-process Server-Side Apply over dynamic objects

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bosun_core::annotations::bosun;
use bosun_core::{Gvk, split_documents};
use kube::api::{DeleteParams, DynamicObject, Patch, PatchParams, PropagationPolicy};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::discovery::ApiResolver;

/// Captured output of an apply or delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Append another capture to this one
    pub fn extend(&mut self, other: CommandOutput) {
        self.stdout.push_str(&other.stdout);
        self.stderr.push_str(&other.stderr);
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// A failed apply or delete, with whatever it printed
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub message: String,
    pub output: CommandOutput,
}

impl CommandFailure {
    pub fn new(message: impl Into<String>, output: CommandOutput) -> Self {
        Self {
            message: message.into(),
            output,
        }
    }
}

/// Result of an applier call
pub type ApplyOutcome = std::result::Result<CommandOutput, CommandFailure>;

/// Parameters of an apply call
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    /// Namespace for objects that do not declare one
    pub namespace: &'a str,
    /// Owning application slug
    pub owner_slug: &'a str,
    pub manifest: &'a str,
    /// Validate on the server without persisting
    pub dry_run: bool,
    pub wait: bool,
    /// Stamp `bosun.io/app-slug` onto the applied objects
    pub annotate_slug: bool,
}

/// Parameters of a delete call
#[derive(Debug, Clone, Copy)]
pub struct RemoveRequest<'a> {
    pub namespace: &'a str,
    pub manifest: &'a str,
    /// Block until the objects are gone
    pub wait: bool,
}

/// Applies and removes manifests
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, request: ApplyRequest<'_>) -> ApplyOutcome;

    /// Delete the objects in a manifest; missing objects are not an error
    async fn remove(&self, request: RemoveRequest<'_>) -> ApplyOutcome;
}

#[async_trait]
impl<A: Applier + ?Sized> Applier for Arc<A> {
    async fn apply(&self, request: ApplyRequest<'_>) -> ApplyOutcome {
        (**self).apply(request).await
    }

    async fn remove(&self, request: RemoveRequest<'_>) -> ApplyOutcome {
        (**self).remove(request).await
    }
}

// ========== kubectl ==========

/// Applier backed by the `kubectl` binary
#[derive(Debug, Clone)]
pub struct KubectlApplier {
    kubectl: PathBuf,
}

impl Default for KubectlApplier {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlApplier {
    pub fn new(kubectl: impl Into<PathBuf>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    /// Arguments for `kubectl apply`
    pub fn apply_args(request: &ApplyRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-n".to_string(),
            request.namespace.to_string(),
            "-f".to_string(),
            "-".to_string(),
        ];
        if request.dry_run {
            args.push("--dry-run=server".to_string());
        }
        if request.wait {
            args.push("--wait".to_string());
        }
        args
    }

    /// Arguments for the slug annotation pass
    pub fn annotate_args(request: &ApplyRequest<'_>) -> Vec<String> {
        vec![
            "annotate".to_string(),
            "--overwrite".to_string(),
            "-n".to_string(),
            request.namespace.to_string(),
            "-f".to_string(),
            "-".to_string(),
            format!("{}={}", bosun::APP_SLUG, request.owner_slug),
        ]
    }

    /// Arguments for `kubectl delete`
    pub fn remove_args(request: &RemoveRequest<'_>) -> Vec<String> {
        vec![
            "delete".to_string(),
            "-n".to_string(),
            request.namespace.to_string(),
            "-f".to_string(),
            "-".to_string(),
            "--ignore-not-found".to_string(),
            format!("--wait={}", request.wait),
        ]
    }

    async fn run(&self, args: &[String], stdin: &str) -> ApplyOutcome {
        run_command(&self.kubectl, args, Some(stdin)).await
    }
}

/// Run an external tool, capturing its output
///
/// A non-zero exit is a [`CommandFailure`] that still carries the output.
pub(crate) async fn run_command(
    program: &Path,
    args: &[String],
    stdin: Option<&str>,
) -> ApplyOutcome {
    let name = program.display().to_string();
    debug!(program = %name, args = ?args, "running");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            CommandFailure::new(
                format!("failed to spawn {}: {}", name, e),
                CommandOutput::default(),
            )
        })?;

    if let (Some(text), Some(mut input)) = (stdin, child.stdin.take()) {
        input.write_all(text.as_bytes()).await.map_err(|e| {
            CommandFailure::new(
                format!("failed to write to {} stdin: {}", name, e),
                CommandOutput::default(),
            )
        })?;
    }

    let output = child.wait_with_output().await.map_err(|e| {
        CommandFailure::new(
            format!("failed to wait for {}: {}", name, e),
            CommandOutput::default(),
        )
    })?;

    let captured = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if output.status.success() {
        Ok(captured)
    } else {
        let verb = args.first().map(String::as_str).unwrap_or("");
        Err(CommandFailure::new(
            format!("{} {} failed ({})", name, verb, output.status),
            captured,
        ))
    }
}

#[async_trait]
impl Applier for KubectlApplier {
    async fn apply(&self, request: ApplyRequest<'_>) -> ApplyOutcome {
        let mut output = self.run(&Self::apply_args(&request), request.manifest).await?;

        if request.annotate_slug && !request.dry_run {
            match self.run(&Self::annotate_args(&request), request.manifest).await {
                Ok(annotated) => output.extend(annotated),
                Err(mut failure) => {
                    output.extend(failure.output);
                    failure.output = output;
                    return Err(failure);
                }
            }
        }

        Ok(output)
    }

    async fn remove(&self, request: RemoveRequest<'_>) -> ApplyOutcome {
        self.run(&Self::remove_args(&request), request.manifest).await
    }
}

// ========== Server-Side Apply ==========

/// Interval between existence checks while waiting for a deletion
const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Applier using Server-Side Apply through the API server
pub struct ServerSideApplier {
    resolver: Arc<ApiResolver>,
    field_manager: String,
}

impl ServerSideApplier {
    pub fn new(resolver: Arc<ApiResolver>, field_manager: impl Into<String>) -> Self {
        Self {
            resolver,
            field_manager: field_manager.into(),
        }
    }

    fn parse(doc: &str) -> std::result::Result<(DynamicObject, Gvk), String> {
        let obj: DynamicObject =
            serde_yaml::from_str(doc).map_err(|e| format!("YAML parse error: {}", e))?;
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| "resource missing apiVersion or kind".to_string())?;
        let gvk = Gvk::from_api_version(&types.api_version, &types.kind);
        Ok((obj, gvk))
    }

    async fn apply_document(
        &self,
        doc: &str,
        request: &ApplyRequest<'_>,
    ) -> std::result::Result<String, String> {
        let (mut obj, gvk) = Self::parse(doc)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| format!("{} missing metadata.name", gvk.kind))?;

        let resolved = self.resolver.resolve(&gvk).await.map_err(|e| e.to_string())?;
        let namespace = obj
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| request.namespace.to_string());
        if resolved.is_namespaced() {
            obj.metadata.namespace = Some(namespace.clone());
        }
        if request.annotate_slug {
            obj.metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(bosun::APP_SLUG.to_string(), request.owner_slug.to_string());
        }

        let mut params = PatchParams::apply(&self.field_manager).force();
        params.dry_run = request.dry_run;

        resolved
            .api(self.resolver.client(), &namespace)
            .patch(&name, &params, &Patch::Apply(&obj))
            .await
            .map_err(|e| format!("failed to apply {}/{}: {}", gvk.kind, name, e))?;

        let suffix = if request.dry_run { " (server dry run)" } else { "" };
        Ok(format!(
            "{}/{} serverside-applied{}\n",
            gvk.kind.to_lowercase(),
            name,
            suffix
        ))
    }

    async fn remove_document(
        &self,
        doc: &str,
        request: &RemoveRequest<'_>,
    ) -> std::result::Result<String, String> {
        let (obj, gvk) = Self::parse(doc)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| format!("{} missing metadata.name", gvk.kind))?;
        let namespace = obj
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| request.namespace.to_string());

        let resolved = match self.resolver.resolve(&gvk).await {
            Ok(r) => r,
            // The type itself is gone, so is the object
            Err(e) => {
                warn!(gvk = %gvk, error = %e, "type not served, treating delete as done");
                return Ok(String::new());
            }
        };
        let api = resolved.api(self.resolver.client(), &namespace);

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match api.delete(&name, &params).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(String::new()),
            Err(e) => return Err(format!("failed to delete {}/{}: {}", gvk.kind, name, e)),
        }

        if request.wait {
            loop {
                match api.get_opt(&name).await {
                    Ok(None) => break,
                    Ok(Some(_)) => tokio::time::sleep(DELETE_POLL_INTERVAL).await,
                    Err(e) => return Err(format!("failed to wait for {}/{}: {}", gvk.kind, name, e)),
                }
            }
        }

        Ok(format!("{} \"{}\" deleted\n", gvk.kind.to_lowercase(), name))
    }
}

#[async_trait]
impl Applier for ServerSideApplier {
    async fn apply(&self, request: ApplyRequest<'_>) -> ApplyOutcome {
        let mut output = CommandOutput::default();
        for doc in split_documents(request.manifest) {
            match self.apply_document(&doc, &request).await {
                Ok(line) => output.stdout.push_str(&line),
                Err(message) => {
                    output.stderr.push_str(&message);
                    output.stderr.push('\n');
                    return Err(CommandFailure::new(message, output));
                }
            }
        }
        Ok(output)
    }

    async fn remove(&self, request: RemoveRequest<'_>) -> ApplyOutcome {
        let mut output = CommandOutput::default();
        for doc in split_documents(request.manifest) {
            match self.remove_document(&doc, &request).await {
                Ok(line) => output.stdout.push_str(&line),
                Err(message) => {
                    output.stderr.push_str(&message);
                    output.stderr.push('\n');
                    return Err(CommandFailure::new(message, output));
                }
            }
        }
        Ok(output)
    }
}
