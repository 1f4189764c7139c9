//! Diff command - show what a new version would delete

use std::path::{Path, PathBuf};

use bosun_core::plan_deletions;
use miette::IntoDiagnostic;

use crate::display;
use crate::error::Result;
use crate::util::{load_config, read_manifests};

/// Run the diff command
pub fn run(
    previous: &Path,
    current: &[PathBuf],
    config_path: Option<&Path>,
    namespace: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let config = load_config(config_path, namespace)?;
    let previous = read_manifests(&[previous.to_path_buf()])?;
    let current = read_manifests(current)?;

    let plan = plan_deletions(&previous, &current, &config.diff_options(), &config.kind_order());
    let summary = plan.summary();

    if output_json {
        println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?);
        return Ok(());
    }

    display::print_plan("DELETIONS", &summary);
    Ok(())
}
