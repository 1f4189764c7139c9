//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use bosun_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Manifests or chart declarations could not be used
    #[error("Manifest error: {message}")]
    #[diagnostic(code(bosun::cli::manifest))]
    Manifest {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid configuration file or option
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bosun::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A deploy or undeploy failed in one of its phases
    #[error("{operation} failed in phase '{phase}': {message}")]
    #[diagnostic(code(bosun::cli::deploy))]
    DeployFailed {
        operation: String,
        phase: String,
        message: String,
    },

    /// Cluster unreachable or request refused
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(bosun::cli::cluster),
        help("check the current kubeconfig context and cluster connectivity")
    )]
    Cluster { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(bosun::cli::io))]
    Io { message: String },

    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(bosun::cli::usage))]
    Usage { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(bosun::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::DeployFailed { .. } => exit_codes::DEPLOY_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a manifest error
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: None,
        }
    }

    /// Create a manifest error with help text
    pub fn manifest_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Api(e) => CliError::Cluster {
                message: e.to_string(),
            },
            KubeError::UnknownResource(kind) => CliError::Cluster {
                message: format!("unknown resource type: {}", kind),
            },
            KubeError::InvalidConfig(message) => CliError::config(message),
            KubeError::InvalidManifest(message) => CliError::manifest(message),
            KubeError::Io(e) => e.into(),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<bosun_core::CoreError> for CliError {
    fn from(err: bosun_core::CoreError) -> Self {
        match err {
            bosun_core::CoreError::Io(e) => e.into(),
            other => CliError::manifest(other.to_string()),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
