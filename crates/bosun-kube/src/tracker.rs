//! Process-wide deploy bookkeeping
//!
//! Both types here are shared between concurrent deploy calls and namespace
//! callbacks, so each serializes its work behind a lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use tracing::{debug, info};

use crate::error::Result;

/// Secret type for registry credentials
const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Last deployed sequence per application
#[derive(Debug, Default)]
pub struct DeployTracker {
    deployed: Mutex<HashMap<String, i64>>,
}

impl DeployTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `sequence` differs from what was last deployed for `app_id`
    pub fn should_deploy(&self, app_id: &str, sequence: i64) -> bool {
        let deployed = self.deployed.lock().unwrap_or_else(PoisonError::into_inner);
        deployed.get(app_id) != Some(&sequence)
    }

    /// Record a successful deploy
    pub fn record(&self, app_id: &str, sequence: i64) {
        let mut deployed = self.deployed.lock().unwrap_or_else(PoisonError::into_inner);
        deployed.insert(app_id.to_string(), sequence);
    }

    pub fn last(&self, app_id: &str) -> Option<i64> {
        let deployed = self.deployed.lock().unwrap_or_else(PoisonError::into_inner);
        deployed.get(app_id).copied()
    }

    /// Drop an application after it has been undeployed
    pub fn forget(&self, app_id: &str) {
        let mut deployed = self.deployed.lock().unwrap_or_else(PoisonError::into_inner);
        deployed.remove(app_id);
    }
}

/// Render a `.dockerconfigjson` payload for one registry
pub fn docker_config_json(registry: &str, username: &str, password: &str) -> String {
    let auth = BASE64.encode(format!("{}:{}", username, password));
    serde_json::json!({
        "auths": {
            registry: {
                "username": username,
                "password": password,
                "auth": auth,
            }
        }
    })
    .to_string()
}

/// Keeps an image pull secret present in the namespaces that need it
pub struct PullSecretEnsurer {
    client: Client,
    name: String,
    config_json: String,
    field_manager: String,
    lock: tokio::sync::Mutex<()>,
}

impl PullSecretEnsurer {
    pub fn new(
        client: Client,
        name: impl Into<String>,
        config_json: impl Into<String>,
        field_manager: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            config_json: config_json.into(),
            field_manager: field_manager.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The Secret object this ensurer writes
    pub fn secret(&self, namespace: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
            data: Some(BTreeMap::from([(
                DOCKER_CONFIG_JSON_KEY.to_string(),
                ByteString(self.config_json.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    /// Create or update the secret in `namespace`
    pub async fn ensure(&self, namespace: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(&self.field_manager).force();
        debug!(namespace = %namespace, secret = %self.name, "ensuring pull secret");
        api.patch(&self.name, &params, &Patch::Apply(&self.secret(namespace)))
            .await?;

        info!(namespace = %namespace, secret = %self.name, "pull secret ensured");
        Ok(())
    }
}
