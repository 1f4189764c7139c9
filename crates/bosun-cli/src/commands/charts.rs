//! Charts command - match chart artifacts to declarations and install them

use std::path::{Path, PathBuf};

use bosun_core::{
    ChartEntry, declared_charts, discover_charts, parse_manifests, removed_charts, sort_charts,
};
use bosun_kube::{ChartOrchestrator, ChartSyncReport, HelmCli};
use console::style;
use miette::IntoDiagnostic;

use crate::display;
use crate::error::{CliError, Result};
use crate::util::{load_config, read_manifests, read_optional};

/// Arguments of the charts command
pub struct ChartsArgs<'a> {
    pub chart_dir: &'a Path,
    pub manifests: &'a [PathBuf],
    pub previous: Option<&'a Path>,
    pub api_version: &'a str,
    pub uninstall: bool,
    pub apply: bool,
    pub output_json: bool,
}

/// Resolve the chart entries declared by `text` against the artifacts on disk
fn resolve(
    chart_dir: &Path,
    text: &str,
    api_version: &str,
    target_namespace: &str,
    uninstall: bool,
) -> Vec<ChartEntry> {
    let declared = declared_charts(&parse_manifests(text));
    let found = discover_charts(chart_dir, api_version);
    sort_charts(&found, &declared, target_namespace, uninstall)
}

/// Run the charts command
pub async fn run(args: ChartsArgs<'_>, config_path: Option<&Path>, namespace: Option<&str>) -> Result<()> {
    if !args.chart_dir.is_dir() {
        return Err(CliError::usage(format!(
            "chart directory not found: {}",
            args.chart_dir.display()
        )));
    }

    let config = load_config(config_path, namespace)?;
    let text = read_manifests(args.manifests)?;
    let previous_text = read_optional(args.previous)?;

    let current = resolve(
        args.chart_dir,
        &text,
        args.api_version,
        &config.target_namespace,
        args.uninstall,
    );
    let previous = resolve(
        args.chart_dir,
        &previous_text,
        args.api_version,
        &config.target_namespace,
        true,
    );

    if !args.apply {
        let removed = removed_charts(&previous, &current);
        if args.output_json {
            let value = serde_json::json!({ "charts": current, "removed": removed });
            println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
        } else {
            let title = if args.uninstall { "Uninstall order" } else { "Install order" };
            display::print_charts(title, &current);
            if !removed.is_empty() {
                println!();
                display::print_charts("Removed", &removed);
            }
        }
        return Ok(());
    }

    let orchestrator = ChartOrchestrator::new(HelmCli::new(&config.helm_path));
    let report = if args.uninstall {
        orchestrator.uninstall_all(&current).await?
    } else {
        orchestrator.sync(&previous, &current).await?
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &ChartSyncReport) {
    for release in &report.uninstalled {
        println!("  {} {}", style("-").red(), release);
    }
    for release in &report.installed {
        println!("  {} {}", style("+").green(), release);
    }
    if !report.output.stdout.trim().is_empty() {
        println!("{}", report.output.stdout.trim_end());
    }
    if !report.output.stderr.trim().is_empty() {
        eprintln!("{}", report.output.stderr.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chart_dir(root: &Path, dir: &str, name: &str, version: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join("Chart.yaml"),
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        )
        .unwrap();
    }

    fn declaration(dir: &str, name: &str, version: &str, weight: i64) -> String {
        format!(
            "apiVersion: bosun.io/v1beta1\nkind: HelmChart\nmetadata:\n  name: {}\nspec:\n  chart:\n    name: {}\n    chartVersion: {}\n  weight: {}\n",
            dir, name, version, weight
        )
    }

    #[test]
    fn test_resolve_orders_and_drops_unmatched() {
        let root = TempDir::new().unwrap();
        chart_dir(root.path(), "redis", "redis", "1.0.0");
        chart_dir(root.path(), "postgresql", "postgresql", "12.1.0");
        chart_dir(root.path(), "stray", "stray", "0.1.0");

        let text = [
            declaration("redis", "redis", "1.0.0", 5),
            declaration("postgresql", "postgresql", "12.1.0", -5),
        ]
        .join("---\n");

        let install = resolve(root.path(), &text, "bosun.io/v1beta1", "shop", false);
        let names: Vec<_> = install.iter().map(|c| c.release_name.as_str()).collect();
        assert_eq!(names, vec!["postgresql", "redis"]);
        assert!(install.iter().all(|c| c.namespace == "shop"));

        let uninstall = resolve(root.path(), &text, "bosun.io/v1beta1", "shop", true);
        let names: Vec<_> = uninstall.iter().map(|c| c.release_name.as_str()).collect();
        assert_eq!(names, vec!["redis", "postgresql"]);
    }

    #[test]
    fn test_resolve_without_declarations_is_empty() {
        let root = TempDir::new().unwrap();
        chart_dir(root.path(), "redis", "redis", "1.0.0");

        assert!(resolve(root.path(), "", "bosun.io/v1beta1", "shop", false).is_empty());
    }
}
