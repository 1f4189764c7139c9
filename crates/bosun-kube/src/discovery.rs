//! API discovery shared by the dynamic code paths
//!
//! Resolves a [`Gvk`] to an `Api<DynamicObject>` the way `kubectl` does,
//! re-running discovery once when a type is unknown (e.g. a CRD applied a
//! moment ago).

use bosun_core::Gvk;
use kube::{
    Client,
    api::{Api, DynamicObject},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope, verbs},
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{KubeError, Result};

/// A resolved resource type
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub resource: ApiResource,
    pub capabilities: ApiCapabilities,
}

impl ResolvedType {
    pub fn is_namespaced(&self) -> bool {
        self.capabilities.scope == Scope::Namespaced
    }

    /// Api for this type, scoped to `namespace` when the type is namespaced
    pub fn api(&self, client: &Client, namespace: &str) -> Api<DynamicObject> {
        if self.is_namespaced() {
            Api::namespaced_with(client.clone(), namespace, &self.resource)
        } else {
            Api::all_with(client.clone(), &self.resource)
        }
    }
}

/// Cached discovery information
pub struct ApiResolver {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl ApiResolver {
    /// Run discovery against the cluster
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    /// Resolve a type, refreshing discovery once on a miss
    pub async fn resolve(&self, gvk: &Gvk) -> Result<ResolvedType> {
        let key = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);

        if let Some(resolved) = self.lookup(&key).await {
            return Ok(resolved);
        }

        debug!(gvk = %gvk, "type not in discovery cache, refreshing");
        self.refresh().await?;

        self.lookup(&key)
            .await
            .ok_or_else(|| KubeError::UnknownResource(gvk.to_string()))
    }

    async fn lookup(&self, gvk: &GroupVersionKind) -> Option<ResolvedType> {
        self.discovery
            .read()
            .await
            .resolve_gvk(gvk)
            .map(|(resource, capabilities)| ResolvedType {
                resource,
                capabilities,
            })
    }

    /// Every namespaced type that can be listed and deleted
    pub async fn namespaced_deletable(&self) -> Vec<ResolvedType> {
        let discovery = self.discovery.read().await;
        discovery
            .groups()
            .flat_map(|group| group.recommended_resources())
            .filter(|(_, caps)| {
                caps.scope == Scope::Namespaced
                    && caps.supports_operation(verbs::LIST)
                    && caps.supports_operation(verbs::DELETE)
            })
            .map(|(resource, capabilities)| ResolvedType {
                resource,
                capabilities,
            })
            .collect()
    }
}
