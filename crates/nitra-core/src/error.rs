//! Error types for Nitra Core.
//!
//! The matchers never fail; these errors come from the boundary adapters
//! that parse catalog/workflow JSON or scan the local ComfyUI directories.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Nitra core library.
#[derive(Debug, Error)]
pub enum NitraError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Input shape errors
    #[error("Invalid workflow: {message}")]
    InvalidWorkflow { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Nitra operations.
pub type Result<T> = std::result::Result<T, NitraError>;

impl From<std::io::Error> for NitraError {
    fn from(err: std::io::Error) -> Self {
        NitraError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NitraError {
    fn from(err: serde_json::Error) -> Self {
        NitraError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<walkdir::Error> for NitraError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let message = err.to_string();
        NitraError::Io {
            message,
            path,
            source: err.into_io_error(),
        }
    }
}

impl NitraError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NitraError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error was caused by malformed caller-supplied data
    /// rather than by the local environment.
    pub fn is_user_input_error(&self) -> bool {
        matches!(
            self,
            NitraError::Json { .. } | NitraError::InvalidWorkflow { .. }
        )
    }
}
