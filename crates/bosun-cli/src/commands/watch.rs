//! Watch command - stream live health status of an application

use std::path::Path;

use bosun_kube::{HookCleaner, Monitor};
use miette::IntoDiagnostic;
use tracing::info;

use crate::display;
use crate::error::{CliError, Result};
use crate::util::{Cluster, load_config};

/// Run the watch command until interrupted, or until every object is ready
/// when `until_ready` is set
pub async fn run(
    app_id: &str,
    sequence: i64,
    informers: &[String],
    clean_hooks: bool,
    until_ready: bool,
    config_path: Option<&Path>,
    namespace: Option<&str>,
    output_json: bool,
) -> Result<()> {
    if informers.is_empty() {
        return Err(CliError::usage("no informers given, e.g. 'deploy/web' or 'shop/svc/web'"));
    }

    let config = load_config(config_path, namespace)?;
    let cluster = Cluster::connect(&config).await?;

    let hooks = clean_hooks.then(|| {
        HookCleaner::new(cluster.client.clone()).spawn(Some(config.target_namespace.clone()))
    });

    let (monitor, mut statuses) = Monitor::spawn(cluster.registry.clone(), &config);
    monitor.apply(app_id, sequence, informers).await?;

    loop {
        tokio::select! {
            status = statuses.recv() => {
                let Some(status) = status else {
                    break;
                };
                if output_json {
                    println!("{}", serde_json::to_string(&status).into_diagnostic()?);
                } else {
                    display::print_status(&status);
                }
                if until_ready && status.state().is_ready() {
                    info!(app = %app_id, "all objects ready");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    monitor.shutdown().await;
    if let Some(hooks) = hooks {
        hooks.abort();
    }
    Ok(())
}
