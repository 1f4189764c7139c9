//! Namespace clearing for undeploys
//!
//! Clearing is best effort: a type that cannot be listed or an object that
//! cannot be deleted is logged and skipped.

use std::sync::Arc;

use async_trait::async_trait;
use bosun_core::selector_to_query;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{DeleteParams, ListParams, PropagationPolicy};
use tracing::{debug, info, warn};

use crate::discovery::ApiResolver;

/// Resource plurals never cleared: they are owned by the API server
const SKIPPED_PLURALS: &[&str] = &["events", "endpoints", "endpointslices", "leases"];

/// Removes the contents of a namespace
#[async_trait]
pub trait NamespaceClearer: Send + Sync {
    /// Delete everything matching `selector` in `namespace`, returning how
    /// many objects were deleted
    async fn clear(&self, namespace: &str, selector: Option<&LabelSelector>) -> usize;
}

/// Clears namespaces through API discovery
pub struct DiscoveryClearer {
    resolver: Arc<ApiResolver>,
}

impl DiscoveryClearer {
    pub fn new(resolver: Arc<ApiResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl NamespaceClearer for DiscoveryClearer {
    async fn clear(&self, namespace: &str, selector: Option<&LabelSelector>) -> usize {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            let query = selector_to_query(selector);
            if !query.is_empty() {
                params = params.labels(&query);
            }
        }
        let delete = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        let mut deleted = 0;
        for resolved in self.resolver.namespaced_deletable().await {
            let plural = resolved.resource.plural.as_str();
            if SKIPPED_PLURALS.contains(&plural) {
                continue;
            }

            let api = resolved.api(self.resolver.client(), namespace);
            let objects = match api.list(&params).await {
                Ok(list) => list.items,
                Err(e) => {
                    warn!(namespace = %namespace, resource = %plural, error = %e, "list failed, skipping");
                    continue;
                }
            };

            for obj in objects {
                let Some(name) = obj.metadata.name.as_deref() else {
                    continue;
                };
                match api.delete(name, &delete).await {
                    Ok(_) => {
                        debug!(namespace = %namespace, resource = %plural, name = %name, "deleted");
                        deleted += 1;
                    }
                    Err(kube::Error::Api(e)) if e.code == 404 => {}
                    Err(e) => {
                        warn!(namespace = %namespace, resource = %plural, name = %name, error = %e, "delete failed, skipping");
                    }
                }
            }
        }

        info!(namespace = %namespace, deleted, "namespace cleared");
        deleted
    }
}
