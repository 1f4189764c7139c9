//! Undeploy command - remove an application and optionally empty namespaces

use std::path::Path;
use std::sync::Arc;

use bosun_kube::{DiscoveryClearer, Executor, ReadinessWaiter, UndeployRequest};
use miette::IntoDiagnostic;

use crate::display;
use crate::error::{CliError, Result};
use crate::util::{Cluster, load_config, read_manifests};

/// Run the undeploy command
pub async fn run(
    app_id: &str,
    previous: &Path,
    clear_namespaces: &[String],
    config_path: Option<&Path>,
    namespace: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let config = load_config(config_path, namespace)?;
    let previous = read_manifests(&[previous.to_path_buf()])?;

    let cluster = Cluster::connect(&config).await?;
    let waiter = ReadinessWaiter::new(
        cluster.registry.clone(),
        cluster.resolver.clone(),
        config.readiness_poll_interval,
    );
    let executor = Executor::new(cluster.applier(&config), waiter, &config)
        .with_clearer(Arc::new(DiscoveryClearer::new(cluster.resolver.clone())));

    let result = executor
        .undeploy(UndeployRequest {
            app_id,
            previous_manifests: &previous,
            clear_namespaces,
        })
        .await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        display::print_deploy_result(&result);
    }

    if result.succeeded {
        Ok(())
    } else {
        Err(CliError::DeployFailed {
            operation: "undeploy".to_string(),
            phase: result.phase.to_string(),
            message: result.error.unwrap_or_default(),
        })
    }
}
