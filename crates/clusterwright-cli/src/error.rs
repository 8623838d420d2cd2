//! CLI error types with exit code handling
//!
//! Every command returns [`CliError`] on failure; `main` renders it through
//! miette and exits with [`CliError::exit_code`].

use clusterwright_core::CoreError;
use clusterwright_engine::EngineError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Spec failed validation
    #[error("Validation failed: {message}")]
    #[diagnostic(code(clusterwright::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Spec document could not be loaded or parsed
    #[error("Spec error: {message}")]
    #[diagnostic(code(clusterwright::cli::spec))]
    Spec {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Nothing stored for the requested cluster
    #[error("{message}")]
    #[diagnostic(code(clusterwright::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid arguments
    #[error("Usage error: {message}")]
    #[diagnostic(code(clusterwright::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(clusterwright::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(clusterwright::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Spec { .. } | CliError::NotFound { .. } | CliError::Other { .. } => {
                exit_codes::ERROR
            }
        }
    }

    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
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

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::other(format!("failed to render JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::other(format!("failed to render YAML: {}", err))
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(io) => CliError::from(io),
            CoreError::SpecNotFound { .. } => CliError::Io {
                message: err.to_string(),
            },
            CoreError::InvalidIdentifier { .. } => CliError::usage_with_help(
                err.to_string(),
                "Identifiers look like /resourceGroups/<group>/clusters/<name>",
            ),
            CoreError::UnknownField { .. } => CliError::usage_with_help(
                err.to_string(),
                "Run `clusterwright describe` to list every field path",
            ),
            other => CliError::Spec {
                message: other.to_string(),
                help: Some("Specs are YAML (or JSON with a .json extension) using camelCase keys".to_string()),
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(errors) => CliError::validation_with_help(
                format!("{} error(s)", errors.len()),
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            EngineError::SnapshotNotFound { id } => CliError::NotFound {
                message: format!("no stored snapshot for cluster '{}'", id),
                help: Some("Snapshots are written by apply or import".to_string()),
            },
            EngineError::Io(io) => CliError::from(io),
            other => CliError::other(other.to_string()),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use clusterwright_core::ClusterId;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CliError::validation_with_help("x", "y").exit_code(),
            exit_codes::VALIDATION_ERROR
        );
        assert_eq!(CliError::other("x").exit_code(), exit_codes::ERROR);
        assert_eq!(
            CliError::from(std::io::Error::other("disk")).exit_code(),
            exit_codes::IO_ERROR
        );
    }

    #[test]
    fn test_engine_errors_map() {
        let id = ClusterId::new("rg", "c1");
        let err = CliError::from(EngineError::SnapshotNotFound { id });
        assert!(matches!(err, CliError::NotFound { .. }));

        let err = CliError::from(CoreError::InvalidIdentifier {
            id: "bad".into(),
            reason: "nope".into(),
        });
        assert_eq!(err.exit_code(), exit_codes::USAGE_ERROR);
    }
}
