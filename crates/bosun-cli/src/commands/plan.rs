//! Plan command - show the phased creation or deletion order of manifests

use std::path::PathBuf;

use bosun_core::{Planner, parse_manifests};
use miette::IntoDiagnostic;

use crate::display;
use crate::error::{CliError, Result};
use crate::util::{load_config, read_manifests};

/// Run the plan command
pub fn run(
    manifests: &[PathBuf],
    config_path: Option<&std::path::Path>,
    namespace: Option<&str>,
    deletion: bool,
    output_json: bool,
) -> Result<()> {
    if manifests.is_empty() {
        return Err(CliError::usage("no manifest files given"));
    }
    let config = load_config(config_path, namespace)?;
    let order = config.kind_order();
    let resources = parse_manifests(&read_manifests(manifests)?);

    for resource in resources.iter().filter(|r| !r.is_identified()) {
        tracing::warn!(
            error = resource.decode_error.as_deref().unwrap_or_default(),
            "document could not be identified, it is planned by raw text"
        );
    }

    let planner = Planner::new(&order);
    let plan = if deletion {
        planner.plan_for_deletion_with_crds(resources)
    } else {
        planner.plan_for_creation(resources)
    };
    let summary = plan.summary();

    if output_json {
        println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?);
        return Ok(());
    }

    let title = if deletion { "DELETION PLAN" } else { "CREATION PLAN" };
    display::print_plan(title, &summary);
    Ok(())
}
