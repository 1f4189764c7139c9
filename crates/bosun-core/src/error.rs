//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Invalid status informer '{input}': expected [namespace/]kind/name")]
    InvalidInformer { input: String },

    #[error("Invalid property path '{path}': {message}")]
    InvalidPropertyPath { path: String, message: String },

    #[error("Invalid wait-for-properties entry '{entry}': expected .path=value")]
    InvalidPropertyWait { entry: String },

    #[error("Chart error: {message}")]
    Chart { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
