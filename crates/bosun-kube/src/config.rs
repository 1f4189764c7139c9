//! Engine configuration
//!
//! Stored as YAML, by default in `~/.config/bosun/config.yaml`. Every field
//! has a default, so an empty or missing file yields a working setup.
//!
//! ```yaml
//! targetNamespace: shop
//! restoreMode: false
//! retainedNamespaces: [shared]
//! readinessPollInterval: 2s
//! statusThrottle: 1s
//! applier: kubectl
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use bosun_core::{DiffOptions, KindOrder};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::error::{KubeError, Result};

/// Which applier implementation deploys resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplierKind {
    /// Shell out to `kubectl`
    #[default]
    Kubectl,
    /// In-process server-side apply
    ServerSide,
}

/// Optional replacement kind tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindOrderConfig {
    #[serde(default)]
    pub creation: Vec<String>,
    #[serde(default)]
    pub deletion: Vec<String>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Namespace for objects that do not declare one
    pub target_namespace: String,

    /// Deploys restore a backup (enables restore exceptions in the diff)
    pub restore_mode: bool,

    /// Restore selector applied to deletions and namespace clearing
    pub restore_selector: Option<LabelSelector>,

    /// Namespaces never deleted by a diff
    pub retained_namespaces: Vec<String>,

    /// Interval between readiness polls
    #[serde(with = "humantime_serde")]
    pub readiness_poll_interval: Duration,

    /// Minimum interval between status pushes per application
    #[serde(with = "humantime_serde")]
    pub status_throttle: Duration,

    /// Resync interval for most watched kinds
    #[serde(with = "humantime_serde")]
    pub watch_resync: Duration,

    /// Resync interval for kinds whose health depends on other objects
    #[serde(with = "humantime_serde")]
    pub endpoint_resync: Duration,

    /// Applier implementation
    pub applier: ApplierKind,

    /// kubectl binary
    pub kubectl_path: PathBuf,

    /// helm binary
    pub helm_path: PathBuf,

    /// Field manager for server-side apply
    pub field_manager: String,

    /// Run a server dry run before committing (when the batch allows it)
    pub dry_run: bool,

    /// Stamp `bosun.io/app-slug` onto applied objects
    pub annotate_slug: bool,

    /// Replacement kind tables (built-in tables when absent)
    pub kind_order: Option<KindOrderConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_namespace: "default".to_string(),
            restore_mode: false,
            restore_selector: None,
            retained_namespaces: Vec::new(),
            readiness_poll_interval: Duration::from_secs(2),
            status_throttle: Duration::from_secs(1),
            watch_resync: Duration::from_secs(60),
            endpoint_resync: Duration::from_secs(10),
            applier: ApplierKind::default(),
            kubectl_path: PathBuf::from("kubectl"),
            helm_path: PathBuf::from("helm"),
            field_manager: "bosun".to_string(),
            dry_run: true,
            annotate_slug: false,
            kind_order: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            KubeError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            KubeError::InvalidConfig("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("bosun").join("config.yaml"))
    }

    /// Diff policy derived from this configuration
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            target_namespace: self.target_namespace.clone(),
            restore_mode: self.restore_mode,
            restore_selector: self.restore_selector.clone(),
            retained_namespaces: self.retained_namespaces.clone(),
        }
    }

    /// Kind tables for the planner
    pub fn kind_order(&self) -> KindOrder {
        match &self.kind_order {
            Some(tables) => KindOrder::new(tables.creation.clone(), tables.deletion.clone()),
            None => KindOrder::standard(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.target_namespace, "default");
        assert_eq!(config.readiness_poll_interval, Duration::from_secs(2));
        assert_eq!(config.status_throttle, Duration::from_secs(1));
        assert_eq!(config.watch_resync, Duration::from_secs(60));
        assert_eq!(config.endpoint_resync, Duration::from_secs(10));
        assert_eq!(config.applier, ApplierKind::Kubectl);
        assert!(config.dry_run);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
targetNamespace: shop
restoreMode: true
restoreSelector:
  matchLabels:
    app: shop
retainedNamespaces: [shared]
readinessPollInterval: 500ms
applier: server-side
"#,
        )
        .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.target_namespace, "shop");
        assert_eq!(config.readiness_poll_interval, Duration::from_millis(500));
        assert_eq!(config.applier, ApplierKind::ServerSide);
        assert_eq!(config.status_throttle, Duration::from_secs(1));

        let opts = config.diff_options();
        assert!(opts.restore_mode);
        assert_eq!(opts.retained_namespaces, vec!["shared"]);
        assert!(opts.restore_selector.is_some());
    }

    #[test]
    fn test_load_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();
        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.field_manager, "bosun");
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "statusThrottle: soon\n").unwrap();
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(KubeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_custom_kind_order() {
        let config = EngineConfig {
            kind_order: Some(KindOrderConfig {
                creation: vec!["Secret".to_string(), "Namespace".to_string()],
                deletion: vec![],
            }),
            ..Default::default()
        };
        let order = config.kind_order();
        assert_eq!(order.creation_rank("Secret"), Some(0));
        assert_eq!(order.deletion_rank("Namespace"), None);
    }
}
