//! Error types for bosun-kube

use thiserror::Error;

/// Result type for bosun-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// External command could not be run or exited non-zero
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    /// Chart install/uninstall failed
    #[error("chart '{release}' in namespace '{namespace}': {message}")]
    Chart {
        release: String,
        namespace: String,
        message: String,
    },

    /// Resource type could not be resolved through discovery
    #[error("unknown resource type: {0}")]
    UnknownResource(String),

    /// Kind has no registered capability
    #[error("kind '{0}' is not supported")]
    UnsupportedKind(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid configuration (bad wait configuration, unreadable config file)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The monitor task is gone
    #[error("monitor is not running")]
    MonitorStopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<bosun_core::CoreError> for KubeError {
    fn from(e: bosun_core::CoreError) -> Self {
        match e {
            bosun_core::CoreError::Io(io) => KubeError::Io(io),
            other => KubeError::InvalidConfig(other.to_string()),
        }
    }
}

impl KubeError {
    /// Check if this is a Not Found error: an API 404, or a tool reporting
    /// a missing object or release
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::Chart { message, .. } | KubeError::Command { message, .. } => {
                output_says_not_found(message)
            }
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

/// Whether command output reports a missing object or release
pub fn output_says_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("not found") || lower.contains("notfound")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_says_not_found() {
        assert!(output_says_not_found("Error: uninstall: Release not loaded: web: release: not found"));
        assert!(output_says_not_found("Error from server (NotFound): configmaps \"x\" not found"));
        assert!(!output_says_not_found("Error: connection refused"));
    }

    #[test]
    fn test_core_error_maps_to_config() {
        let err: KubeError = bosun_core::CoreError::InvalidPropertyWait {
            entry: ".x".to_string(),
        }
        .into();
        assert!(matches!(err, KubeError::InvalidConfig(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_chart_not_found() {
        let err = KubeError::Chart {
            release: "web".to_string(),
            namespace: "shop".to_string(),
            message: "Error: uninstall: Release not loaded: web: release: not found".to_string(),
        };
        assert!(err.is_not_found());
    }
}
