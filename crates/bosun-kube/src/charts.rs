//! Chart orchestration
//!
//! Decides which chart releases to remove and install, and in what order.
//! The package manager itself is behind [`ChartInstaller`]; [`HelmCli`]
//! drives the `helm` binary.

use std::path::PathBuf;

use async_trait::async_trait;
use bosun_core::{ChartEntry, removed_charts};
use tracing::{debug, info, warn};

use crate::applier::{CommandOutput, run_command};
use crate::error::{KubeError, Result};

/// Installs and removes chart releases
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Install or upgrade the release for `chart`
    async fn install(&self, chart: &ChartEntry) -> Result<CommandOutput>;

    /// Uninstall the release for `chart`; a missing release is an error
    /// whose [`KubeError::is_not_found`] is true
    async fn uninstall(&self, chart: &ChartEntry) -> Result<CommandOutput>;
}

/// Installer backed by the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm: PathBuf,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

impl HelmCli {
    pub fn new(helm: impl Into<PathBuf>) -> Self {
        Self { helm: helm.into() }
    }

    /// Arguments for `helm upgrade --install`
    pub fn install_args(chart: &ChartEntry) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            chart.release_name.clone(),
            chart.path.display().to_string(),
            "--namespace".to_string(),
            chart.namespace.clone(),
        ];
        args.extend(chart.upgrade_flags.iter().cloned());
        args
    }

    /// Arguments for `helm uninstall`
    pub fn uninstall_args(chart: &ChartEntry) -> Vec<String> {
        vec![
            "uninstall".to_string(),
            chart.release_name.clone(),
            "--namespace".to_string(),
            chart.namespace.clone(),
        ]
    }

    async fn run(&self, chart: &ChartEntry, args: &[String]) -> Result<CommandOutput> {
        run_command(&self.helm, args, None).await.map_err(|failure| {
            let message = if failure.output.stderr.trim().is_empty() {
                failure.message
            } else {
                failure.output.stderr.trim().to_string()
            };
            KubeError::Chart {
                release: chart.release_name.clone(),
                namespace: chart.namespace.clone(),
                message,
            }
        })
    }
}

#[async_trait]
impl ChartInstaller for HelmCli {
    async fn install(&self, chart: &ChartEntry) -> Result<CommandOutput> {
        self.run(chart, &Self::install_args(chart)).await
    }

    async fn uninstall(&self, chart: &ChartEntry) -> Result<CommandOutput> {
        self.run(chart, &Self::uninstall_args(chart)).await
    }
}

/// Outcome of a chart sync
#[derive(Debug, Clone, Default)]
pub struct ChartSyncReport {
    /// Releases uninstalled, as `namespace/release`
    pub uninstalled: Vec<String>,
    pub installed: Vec<String>,
    pub output: CommandOutput,
}

fn release_ref(chart: &ChartEntry) -> String {
    format!("{}/{}", chart.namespace, chart.release_name)
}

/// Runs chart removals and installs in order
pub struct ChartOrchestrator<I> {
    installer: I,
}

impl<I: ChartInstaller> ChartOrchestrator<I> {
    pub fn new(installer: I) -> Self {
        Self { installer }
    }

    /// Uninstall charts gone from `current`, then install `current`
    ///
    /// Both lists are expected in the order produced by `sort_charts`:
    /// `previous` in any order, `current` in install order.
    pub async fn sync(&self, previous: &[ChartEntry], current: &[ChartEntry]) -> Result<ChartSyncReport> {
        let mut report = ChartSyncReport::default();

        for chart in removed_charts(previous, current) {
            self.uninstall_one(&chart, &mut report).await?;
        }

        for chart in current {
            info!(release = %chart.release_name, namespace = %chart.namespace, weight = chart.weight, "installing chart");
            let output = self.installer.install(chart).await?;
            report.output.extend(output);
            report.installed.push(release_ref(chart));
        }

        Ok(report)
    }

    /// Uninstall every chart, in the given (uninstall) order
    pub async fn uninstall_all(&self, charts: &[ChartEntry]) -> Result<ChartSyncReport> {
        let mut report = ChartSyncReport::default();
        for chart in charts {
            self.uninstall_one(chart, &mut report).await?;
        }
        Ok(report)
    }

    async fn uninstall_one(&self, chart: &ChartEntry, report: &mut ChartSyncReport) -> Result<()> {
        info!(release = %chart.release_name, namespace = %chart.namespace, "uninstalling chart");
        match self.installer.uninstall(chart).await {
            Ok(output) => {
                report.output.extend(output);
                report.uninstalled.push(release_ref(chart));
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(release = %chart.release_name, "release already gone");
                report.uninstalled.push(release_ref(chart));
                Ok(())
            }
            Err(e) => {
                warn!(release = %chart.release_name, error = %e, "uninstall failed");
                Err(e)
            }
        }
    }
}
