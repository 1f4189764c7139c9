//! Readiness and property waits
//!
//! Waits poll at a fixed interval and never time out on their own: a missing
//! object or a transient API error is logged and polled again. A malformed
//! property path fails immediately. Callers wanting a deadline wrap the
//! whole deploy in `tokio::time::timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bosun_core::{KindAliases, PropertyPath, Resource, State};
use tracing::{debug, info, warn};

use crate::discovery::ApiResolver;
use crate::error::{KubeError, Result};
use crate::registry::KindRegistry;

/// Blocks until a resource is ready or a property holds
#[async_trait]
pub trait ResourceWaiter: Send + Sync {
    /// Wait until the resource's kind reports `Ready`
    async fn wait_for_ready(&self, resource: &Resource, namespace: &str) -> Result<()>;

    /// Wait until the value at `path` renders to `expected`
    async fn wait_for_property(
        &self,
        resource: &Resource,
        namespace: &str,
        path: &str,
        expected: &str,
    ) -> Result<()>;
}

/// Outcome of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Done,
    NotFound,
    Pending(String),
}

/// Poll `check` every `interval` until it reports [`Check::Done`]
pub async fn poll_until<F, Fut>(interval: Duration, what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Check>,
{
    loop {
        match check().await {
            Check::Done => {
                debug!(resource = what, "wait satisfied");
                return;
            }
            Check::NotFound => info!(resource = what, "not found yet, waiting"),
            Check::Pending(reason) => debug!(resource = what, reason = %reason, "waiting"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Point read of an arbitrary object, used for kinds without a capability
/// and for property waits
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// The object as JSON; `None` when it does not exist
    async fn fetch(&self, resource: &Resource, namespace: &str) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
impl ObjectFetcher for ApiResolver {
    async fn fetch(&self, resource: &Resource, namespace: &str) -> Result<Option<serde_json::Value>> {
        let gvk = resource
            .gvk
            .as_ref()
            .ok_or_else(|| KubeError::InvalidManifest("unidentified resource".to_string()))?;
        let api = self.resolve(gvk).await?.api(self.client(), namespace);

        match api.get_opt(resource.name()).await? {
            Some(obj) => Ok(Some(serde_json::to_value(&obj)?)),
            None => Ok(None),
        }
    }
}

/// Waiter backed by the kind registry, with a dynamic fallback
pub struct ReadinessWaiter {
    registry: Arc<KindRegistry>,
    fetcher: Arc<dyn ObjectFetcher>,
    aliases: KindAliases,
    interval: Duration,
}

impl ReadinessWaiter {
    pub fn new(registry: Arc<KindRegistry>, fetcher: Arc<dyn ObjectFetcher>, interval: Duration) -> Self {
        Self {
            registry,
            fetcher,
            aliases: KindAliases::standard(),
            interval,
        }
    }
}

fn target_namespace<'a>(resource: &'a Resource, namespace: &'a str) -> &'a str {
    resource.namespace().unwrap_or(namespace)
}

#[async_trait]
impl ResourceWaiter for ReadinessWaiter {
    async fn wait_for_ready(&self, resource: &Resource, namespace: &str) -> Result<()> {
        if !resource.is_identified() {
            return Err(KubeError::InvalidManifest(
                "cannot wait for an unidentified resource".to_string(),
            ));
        }
        let namespace = target_namespace(resource, namespace);
        let what = resource.key();
        let kind = self.aliases.resolve(resource.kind());

        match self.registry.get(&kind) {
            Some(capability) => {
                poll_until(self.interval, &what, || async {
                    match capability.state_of(namespace, resource.name()).await {
                        Ok(Some(State::Ready)) => Check::Done,
                        Ok(Some(state)) => Check::Pending(state.to_string()),
                        Ok(None) => Check::NotFound,
                        Err(e) => {
                            warn!(resource = %what, error = %e, "readiness check failed, retrying");
                            Check::Pending(e.to_string())
                        }
                    }
                })
                .await;
            }
            None => {
                debug!(kind = %kind, "no registered capability, waiting for existence");
                poll_until(self.interval, &what, || async {
                    match self.fetcher.fetch(resource, namespace).await {
                        Ok(Some(_)) => Check::Done,
                        Ok(None) => Check::NotFound,
                        Err(e) => {
                            warn!(resource = %what, error = %e, "existence check failed, retrying");
                            Check::Pending(e.to_string())
                        }
                    }
                })
                .await;
            }
        }

        Ok(())
    }

    async fn wait_for_property(
        &self,
        resource: &Resource,
        namespace: &str,
        path: &str,
        expected: &str,
    ) -> Result<()> {
        let property = PropertyPath::parse(path)?;
        if !resource.is_identified() {
            return Err(KubeError::InvalidManifest(
                "cannot wait for an unidentified resource".to_string(),
            ));
        }
        let namespace = target_namespace(resource, namespace);
        let what = format!("{} {}={}", resource.key(), property, expected);

        poll_until(self.interval, &what, || async {
            match self.fetcher.fetch(resource, namespace).await {
                Ok(Some(value)) if property.matches(&value, expected) => Check::Done,
                Ok(Some(_)) => Check::Pending("value differs".to_string()),
                Ok(None) => Check::NotFound,
                Err(e) => {
                    warn!(resource = %what, error = %e, "property check failed, retrying");
                    Check::Pending(e.to_string())
                }
            }
        })
        .await;

        Ok(())
    }
}
