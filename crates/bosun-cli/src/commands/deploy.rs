//! Deploy command - apply a new sequence of an application

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bosun_kube::{
    DeployRequest, DeployTracker, Executor, PullSecretEnsurer, ReadinessWaiter,
    docker_config_json,
};
use miette::IntoDiagnostic;
use tracing::info;

use crate::display;
use crate::error::{CliError, Result};
use crate::util::{Cluster, load_config, read_manifests, read_optional};

/// Registry credentials for an image pull secret
#[derive(Debug)]
pub struct PullSecret {
    pub name: String,
    pub registry: String,
    pub username: String,
    pub password: String,
}

/// Arguments of the deploy command
pub struct DeployArgs<'a> {
    pub app_id: &'a str,
    pub sequence: i64,
    pub owner_slug: Option<&'a str>,
    pub manifests: &'a [PathBuf],
    pub previous: Option<&'a Path>,
    pub no_dry_run: bool,
    pub pull_secret: Option<PullSecret>,
    pub output_json: bool,
}

/// Run the deploy command
pub async fn run(args: DeployArgs<'_>, config_path: Option<&Path>, namespace: Option<&str>) -> Result<()> {
    let mut config = load_config(config_path, namespace)?;
    if args.no_dry_run {
        config.dry_run = false;
    }

    let manifests = read_manifests(args.manifests)?;
    let previous = read_optional(args.previous)?;

    let cluster = Cluster::connect(&config).await?;

    if let Some(secret) = &args.pull_secret {
        let ensurer = PullSecretEnsurer::new(
            cluster.client.clone(),
            &secret.name,
            docker_config_json(&secret.registry, &secret.username, &secret.password),
            &config.field_manager,
        );
        ensurer.ensure(&config.target_namespace).await?;
    }

    let waiter = ReadinessWaiter::new(
        cluster.registry.clone(),
        cluster.resolver.clone(),
        config.readiness_poll_interval,
    );
    let tracker = Arc::new(DeployTracker::new());
    let executor =
        Executor::new(cluster.applier(&config), waiter, &config).with_tracker(tracker.clone());

    let result = executor
        .deploy(DeployRequest {
            app_id: args.app_id,
            sequence: args.sequence,
            owner_slug: args.owner_slug.unwrap_or(args.app_id),
            previous_manifests: &previous,
            manifests: &manifests,
        })
        .await;

    if args.output_json {
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        display::print_deploy_result(&result);
    }

    if result.succeeded {
        info!(app = %args.app_id, sequence = ?tracker.last(args.app_id), "recorded deployed sequence");
        Ok(())
    } else {
        Err(CliError::DeployFailed {
            operation: "deploy".to_string(),
            phase: result.phase.to_string(),
            message: result.error.unwrap_or_default(),
        })
    }
}
