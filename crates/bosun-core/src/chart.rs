//! Chart discovery and install ordering
//!
//! Chart artifacts found on disk are correlated with the `HelmChart`
//! declarations shipped in the application's manifests. Only matched charts
//! are installed; the package manager itself is driven elsewhere.
//!
//! ```yaml
//! apiVersion: bosun.io/v1beta1
//! kind: HelmChart
//! metadata:
//!   name: postgresql          # directory name of the artifact
//! spec:
//!   chart:
//!     name: postgresql
//!     chartVersion: 12.1.0
//!   releaseName: db
//!   namespace: data
//!   weight: -5
//!   helmUpgradeFlags: ["--timeout", "10m"]
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::resource::Resource;

/// Kind of chart declaration documents
pub const HELM_CHART_KIND: &str = "HelmChart";

/// A chart artifact found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundChart {
    pub dir_name: String,
    pub path: PathBuf,
    pub chart_name: String,
    pub chart_version: String,
    /// API version of the declarations this artifact belongs to
    pub api_version: String,
}

/// A `HelmChart` declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub dir_name: String,
    pub api_version: String,
    pub chart_name: String,
    pub chart_version: String,
    pub release_name: String,
    pub namespace: String,
    pub weight: i64,
    pub upgrade_flags: Vec<String>,
}

/// A matched chart ready to be installed or uninstalled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub dir_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub release_name: String,
    pub namespace: String,
    pub weight: i64,
    pub upgrade_flags: Vec<String>,
    pub api_version: String,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMetadata {
    name: String,
    version: String,
}

impl ChartSpec {
    /// Build from a `HelmChart` document
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        if resource.kind() != HELM_CHART_KIND {
            return Err(CoreError::InvalidManifest {
                message: format!("expected {}, got '{}'", HELM_CHART_KIND, resource.kind()),
            });
        }
        if resource.name().is_empty() {
            return Err(CoreError::InvalidManifest {
                message: "HelmChart without metadata.name".to_string(),
            });
        }

        let spec = resource.decoded.get("spec");
        let text = |path: &[&str]| -> String {
            let mut current = spec;
            for key in path {
                current = current.and_then(|v| v.get(*key));
            }
            match current {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };

        let weight = match spec.and_then(|s| s.get("weight")) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| CoreError::InvalidManifest {
                message: format!("HelmChart {}: weight '{}' is not an integer", resource.name(), s),
            })?,
            Some(other) => {
                return Err(CoreError::InvalidManifest {
                    message: format!("HelmChart {}: invalid weight {:?}", resource.name(), other),
                });
            }
        };

        let upgrade_flags = spec
            .and_then(|s| s.get("helmUpgradeFlags"))
            .and_then(Value::as_sequence)
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|f| f.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            dir_name: resource.name().to_string(),
            api_version: resource.api_version(),
            chart_name: text(&["chart", "name"]),
            chart_version: text(&["chart", "chartVersion"]),
            release_name: text(&["releaseName"]),
            namespace: text(&["namespace"]),
            weight,
            upgrade_flags,
        })
    }

    fn matches(&self, found: &FoundChart) -> bool {
        self.dir_name == found.dir_name
            && self.api_version == found.api_version
            && (self.chart_name.is_empty() || self.chart_name == found.chart_name)
            && (self.chart_version.is_empty() || self.chart_version == found.chart_version)
    }
}

/// Collect `HelmChart` declarations from classified manifests
///
/// Declarations that fail to parse are logged and skipped.
pub fn declared_charts(resources: &[Resource]) -> Vec<ChartSpec> {
    resources
        .iter()
        .filter(|r| r.kind() == HELM_CHART_KIND)
        .filter_map(|r| match ChartSpec::from_resource(r) {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!(error = %e, "skipping invalid chart declaration");
                None
            }
        })
        .collect()
}

/// Discover chart artifacts directly under `root`
///
/// Both unpacked chart directories (containing `Chart.yaml`) and `.tgz`
/// archives are recognized. Unreadable entries are logged and skipped.
pub fn discover_charts(root: &Path, api_version: &str) -> Vec<FoundChart> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, root = %root.display(), "failed to list chart directory entry");
                continue;
            }
        };
        let path = entry.path();

        let result = if entry.file_type().is_dir() {
            read_chart_dir(path)
        } else if is_chart_archive(path) {
            read_chart_archive(path)
        } else {
            continue;
        };

        match result {
            Ok(Some((dir_name, meta))) => {
                debug!(chart = %meta.name, version = %meta.version, path = %path.display(), "found chart");
                found.push(FoundChart {
                    dir_name,
                    path: path.to_path_buf(),
                    chart_name: meta.name,
                    chart_version: meta.version,
                    api_version: api_version.to_string(),
                });
            }
            Ok(None) => debug!(path = %path.display(), "not a chart, skipping"),
            Err(e) => warn!(error = %e, path = %path.display(), "failed to read chart, skipping"),
        }
    }

    found
}

fn is_chart_archive(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

fn read_chart_dir(path: &Path) -> Result<Option<(String, ChartMetadata)>> {
    let chart_yaml = path.join("Chart.yaml");
    if !chart_yaml.exists() {
        return Ok(None);
    }
    let meta: ChartMetadata = serde_yaml::from_str(&std::fs::read_to_string(&chart_yaml)?)?;
    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Some((dir_name, meta)))
}

/// Read `<top>/Chart.yaml` from a packaged chart; `<top>` becomes the dir name
fn read_chart_archive(path: &Path) -> Result<Option<(String, ChartMetadata)>> {
    let file = File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_path_buf();
        let components: Vec<_> = entry_path.components().collect();

        if components.len() == 2 && entry_path.file_name().is_some_and(|n| n == "Chart.yaml") {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            let meta: ChartMetadata = serde_yaml::from_str(&content)?;
            let dir_name = components[0].as_os_str().to_string_lossy().to_string();
            return Ok(Some((dir_name, meta)));
        }
    }

    Ok(None)
}

/// Match artifacts to declarations and order them
///
/// Artifacts without a matching declaration are dropped. Declarations that
/// leave the chart name or version empty accept whatever is on disk. The
/// namespace comes from the declaration, falling back to `target_namespace`.
pub fn sort_charts(
    found: &[FoundChart],
    declared: &[ChartSpec],
    target_namespace: &str,
    uninstall: bool,
) -> Vec<ChartEntry> {
    let mut entries = Vec::new();

    for chart in found {
        let Some(spec) = declared.iter().find(|spec| spec.matches(chart)) else {
            info!(
                dir = %chart.dir_name,
                chart = %chart.chart_name,
                version = %chart.chart_version,
                "no matching chart declaration, skipping"
            );
            continue;
        };

        entries.push(ChartEntry {
            dir_name: chart.dir_name.clone(),
            chart_name: chart.chart_name.clone(),
            chart_version: chart.chart_version.clone(),
            release_name: if spec.release_name.is_empty() {
                chart.chart_name.clone()
            } else {
                spec.release_name.clone()
            },
            namespace: if spec.namespace.is_empty() {
                target_namespace.to_string()
            } else {
                spec.namespace.clone()
            },
            weight: spec.weight,
            upgrade_flags: spec.upgrade_flags.clone(),
            api_version: chart.api_version.clone(),
            path: chart.path.clone(),
        });
    }

    for spec in declared {
        if !found.iter().any(|chart| spec.matches(chart)) {
            warn!(dir = %spec.dir_name, chart = %spec.chart_name, "declared chart has no artifact");
        }
    }

    order_entries(&mut entries, uninstall);
    entries
}

/// Charts in `previous` with no counterpart (same namespace and dir name) in
/// `current`, in uninstall order
pub fn removed_charts(previous: &[ChartEntry], current: &[ChartEntry]) -> Vec<ChartEntry> {
    let mut removed: Vec<ChartEntry> = previous
        .iter()
        .filter(|prev| {
            !current
                .iter()
                .any(|cur| cur.namespace == prev.namespace && cur.dir_name == prev.dir_name)
        })
        .cloned()
        .collect();

    order_entries(&mut removed, true);
    removed
}

/// Ascending `(weight, chart_name)` for install, the exact reverse for uninstall
pub fn order_entries(entries: &mut [ChartEntry], uninstall: bool) {
    entries.sort_by(|a, b| (a.weight, &a.chart_name).cmp(&(b.weight, &b.chart_name)));
    if uninstall {
        entries.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    const API: &str = "bosun.io/v1beta1";

    fn found(dir: &str, name: &str, version: &str) -> FoundChart {
        FoundChart {
            dir_name: dir.to_string(),
            path: PathBuf::from(format!("/charts/{}", dir)),
            chart_name: name.to_string(),
            chart_version: version.to_string(),
            api_version: API.to_string(),
        }
    }

    fn spec(dir: &str, weight: i64) -> ChartSpec {
        ChartSpec {
            dir_name: dir.to_string(),
            api_version: API.to_string(),
            weight,
            ..Default::default()
        }
    }

    fn names(entries: &[ChartEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.chart_name.as_str()).collect()
    }

    #[test]
    fn test_chart_spec_from_resource() {
        let resource = Resource::decode(
            r#"
apiVersion: bosun.io/v1beta1
kind: HelmChart
metadata:
  name: postgresql
spec:
  chart:
    name: postgresql
    chartVersion: 12.1.0
  releaseName: db
  namespace: data
  weight: -5
  helmUpgradeFlags:
    - --timeout
    - 10m
"#,
        );
        let spec = ChartSpec::from_resource(&resource).unwrap();
        assert_eq!(spec.dir_name, "postgresql");
        assert_eq!(spec.api_version, API);
        assert_eq!(spec.chart_version, "12.1.0");
        assert_eq!(spec.release_name, "db");
        assert_eq!(spec.namespace, "data");
        assert_eq!(spec.weight, -5);
        assert_eq!(spec.upgrade_flags, vec!["--timeout", "10m"]);
    }

    #[test]
    fn test_chart_spec_rejects_bad_weight() {
        let resource = Resource::decode(
            "apiVersion: bosun.io/v1beta1\nkind: HelmChart\nmetadata:\n  name: x\nspec:\n  weight: heavy\n",
        );
        assert!(ChartSpec::from_resource(&resource).is_err());
        assert!(declared_charts(&[resource]).is_empty());
    }

    #[test]
    fn test_install_and_uninstall_order() {
        let found = vec![
            found("e", "echo", "1"),
            found("b", "bravo", "1"),
            found("d", "delta", "1"),
            found("a", "alpha", "1"),
            found("c", "charlie", "1"),
        ];
        let declared = vec![
            spec("a", 5),
            spec("b", 0),
            spec("c", -5),
            spec("d", 1),
            spec("e", 0),
        ];

        let install = sort_charts(&found, &declared, "default", false);
        assert_eq!(names(&install), vec!["charlie", "bravo", "echo", "delta", "alpha"]);

        let uninstall = sort_charts(&found, &declared, "default", true);
        let mut reversed = names(&install);
        reversed.reverse();
        assert_eq!(names(&uninstall), reversed);
    }

    #[test]
    fn test_unmatched_artifacts_are_dropped() {
        let found = vec![found("redis", "redis", "7.0.0"), found("extra", "extra", "1")];
        let mut declared = spec("redis", 0);
        declared.chart_version = "6.0.0".to_string();

        assert!(sort_charts(&found, &[declared.clone()], "default", false).is_empty());

        declared.chart_version = "7.0.0".to_string();
        let entries = sort_charts(&found, &[declared], "default", false);
        assert_eq!(names(&entries), vec!["redis"]);
    }

    #[test]
    fn test_api_version_must_match() {
        let found = vec![found("redis", "redis", "7.0.0")];
        let mut declared = spec("redis", 0);
        declared.api_version = "bosun.io/v1beta2".to_string();
        assert!(sort_charts(&found, &[declared], "default", false).is_empty());
    }

    #[test]
    fn test_namespace_and_release_defaults() {
        let found = vec![found("redis", "redis", "7.0.0"), found("pg", "postgresql", "12")];
        let mut pg = spec("pg", 0);
        pg.namespace = "data".to_string();
        pg.release_name = "db".to_string();

        let entries = sort_charts(&found, &[spec("redis", 0), pg], "apps", false);
        assert_eq!(entries[0].chart_name, "postgresql");
        assert_eq!(entries[0].namespace, "data");
        assert_eq!(entries[0].release_name, "db");
        assert_eq!(entries[1].namespace, "apps");
        assert_eq!(entries[1].release_name, "redis");
    }

    #[test]
    fn test_removed_charts() {
        let found_prev = vec![
            found("a", "alpha", "1"),
            found("b", "bravo", "1"),
            found("c", "charlie", "1"),
        ];
        let prev = sort_charts(
            &found_prev,
            &[spec("a", 0), spec("b", 3), spec("c", 1)],
            "default",
            false,
        );
        let cur = sort_charts(&[found("a", "alpha", "2")], &[spec("a", 0)], "default", false);

        let removed = removed_charts(&prev, &cur);
        assert_eq!(names(&removed), vec!["bravo", "charlie"]);

        // A namespace move counts as a removal
        let mut moved = cur.clone();
        moved[0].namespace = "elsewhere".to_string();
        assert_eq!(removed_charts(&cur, &moved).len(), 1);
    }

    fn write_archive(path: &Path, top: &str, chart_yaml: &str) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_size(chart_yaml.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/Chart.yaml", top), chart_yaml.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_discover_charts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        std::fs::create_dir(root.join("nginx")).unwrap();
        std::fs::write(
            root.join("nginx/Chart.yaml"),
            "apiVersion: v2\nname: nginx\nversion: 1.2.3\n",
        )
        .unwrap();
        std::fs::create_dir(root.join("not-a-chart")).unwrap();
        std::fs::write(root.join("README.md"), "hello").unwrap();
        write_archive(
            &root.join("redis-7.0.0.tgz"),
            "redis",
            "apiVersion: v2\nname: redis\nversion: 7.0.0\n",
        );
        std::fs::write(root.join("broken.tgz"), "not gzip").unwrap();

        let charts = discover_charts(root, API);
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].dir_name, "nginx");
        assert_eq!(charts[0].chart_version, "1.2.3");
        assert_eq!(charts[1].dir_name, "redis");
        assert_eq!(charts[1].chart_name, "redis");
        assert!(charts.iter().all(|c| c.api_version == API));
    }
}
