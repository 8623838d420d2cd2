//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Spec file not found: {path}")]
    SpecNotFound { path: String },

    #[error("Invalid cluster identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("Unknown field path: {path}")]
    UnknownField { path: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
