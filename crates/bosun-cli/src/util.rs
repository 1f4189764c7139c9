//! Shared helpers for CLI commands

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bosun_kube::{
    ApiResolver, Applier, ApplierKind, EngineConfig, KindRegistry, KubectlApplier,
    ServerSideApplier,
};
use tracing::debug;

use crate::error::{CliError, Result};

/// Document separator used when joining manifest files
const SEPARATOR: &str = "\n---\n";

/// Read and join manifest files; `-` reads stdin
///
/// An empty list yields empty text.
pub fn read_manifests(paths: &[PathBuf]) -> Result<String> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = if path.as_os_str() == "-" {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        } else {
            std::fs::read_to_string(path).map_err(|e| {
                CliError::manifest_with_help(
                    format!("cannot read {}: {}", path.display(), e),
                    "pass rendered manifest files, or '-' for stdin",
                )
            })?
        };
        documents.push(text);
    }
    Ok(documents.join(SEPARATOR))
}

/// Read an optional manifest file
pub fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_manifests(&[path.to_path_buf()]),
        None => Ok(String::new()),
    }
}

/// Load the engine configuration; a missing file yields defaults
pub fn load_config(path: Option<&Path>, namespace: Option<&str>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) if path.exists() => EngineConfig::load_from(path)?,
        Some(path) => {
            debug!(path = %path.display(), "config file not found, using defaults");
            EngineConfig::default()
        }
        None => EngineConfig::load()?,
    };

    if let Some(namespace) = namespace {
        config.target_namespace = namespace.to_string();
    }
    Ok(config)
}

/// Everything a cluster-facing command needs
pub struct Cluster {
    pub client: kube::Client,
    pub resolver: Arc<ApiResolver>,
    pub registry: Arc<KindRegistry>,
}

impl Cluster {
    /// Connect with the ambient kubeconfig and run discovery
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let client = kube::Client::try_default().await.map_err(|e| CliError::Cluster {
            message: e.to_string(),
        })?;
        let resolver = Arc::new(ApiResolver::new(client.clone()).await?);
        let registry = Arc::new(KindRegistry::standard(client.clone(), config));

        Ok(Self {
            client,
            resolver,
            registry,
        })
    }

    /// The applier selected by the configuration
    pub fn applier(&self, config: &EngineConfig) -> Arc<dyn Applier> {
        match config.applier {
            ApplierKind::Kubectl => Arc::new(KubectlApplier::new(&config.kubectl_path)),
            ApplierKind::ServerSide => Arc::new(ServerSideApplier::new(
                self.resolver.clone(),
                config.field_manager.clone(),
            )),
        }
    }
}
