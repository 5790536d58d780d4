//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No filesystem, HTTP or engine-specific types in any signature
//! - Long-running work is exposed as a lazy stream the caller pulls
//! - Failures carry an opaque reason string from the collaborator

pub mod event_emitter;
pub mod inference_engine;
pub mod model_repository;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use inference_engine::{EngineSession, InferenceEngine, SessionParams, TokenStream};
pub use model_repository::{ModelRepository, ProgressStream};

/// Errors reported by a `ModelRepository`.
///
/// Serializable so it can travel inside events and state values.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageError {
    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Network/HTTP error while fetching an artifact.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The artifact does not exist at its source.
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// General/uncategorized error.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Errors reported by the inference engine.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    /// The engine could not load the model weights.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Any failure while sending a prompt or producing tokens.
    #[error("Engine error: {0}")]
    Engine(String),
}

impl EngineError {
    pub fn engine(reason: impl Into<String>) -> Self {
        Self::Engine(reason.into())
    }

    pub fn model_load(reason: impl Into<String>) -> Self {
        Self::ModelLoad(reason.into())
    }

    /// The engine-supplied reason without the category prefix.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::ModelLoad(reason) | Self::Engine(reason) => reason,
        }
    }
}

/// Umbrella error for callers that drive the whole core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Catalog(#[from] crate::domain::CatalogError),

    #[error(transparent)]
    Lifecycle(#[from] crate::services::LifecycleError),

    #[error(transparent)]
    Session(#[from] crate::services::SessionError),

    #[error(transparent)]
    Transcript(#[from] crate::chat::TranscriptError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Settings validation error.
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    #[error(transparent)]
    Path(#[from] crate::paths::PathError),

    /// Validation error (invalid input).
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        match StorageError::from_io_error(&io_err) {
            StorageError::Io { kind, message } => {
                assert_eq!(kind, "PermissionDenied");
                assert!(message.contains("denied"));
            }
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_error_reason() {
        assert_eq!(EngineError::engine("out of memory").reason(), "out of memory");
        assert_eq!(
            EngineError::model_load("bad weights").to_string(),
            "Failed to load model: bad weights"
        );
    }
}
