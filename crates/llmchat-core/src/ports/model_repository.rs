//! Model repository trait definition.
//!
//! This port defines the interface for on-device model artifact storage.
//! Implementations must handle all storage details internally.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::StorageError;
use crate::domain::EngineIdentifier;

/// Lazy sequence of progress fractions produced by [`ModelRepository::fetch`].
///
/// Ends normally on success or with a single `Err` item on failure.
pub type ProgressStream = BoxStream<'static, Result<f64, StorageError>>;

/// Repository for model artifacts.
///
/// Constructed once at process start and injected into the lifecycle
/// manager. Artifacts are addressed by the engine identifier, never by the
/// catalog id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Whether the artifact is already stored on the device.
    async fn exists(&self, engine_id: &EngineIdentifier) -> Result<bool, StorageError>;

    /// Start fetching the artifact.
    ///
    /// Nothing happens until the returned stream is polled. Dropping the
    /// stream abandons the fetch.
    fn fetch(&self, engine_id: &EngineIdentifier) -> ProgressStream;

    /// Remove the artifact. Removing a missing artifact succeeds.
    async fn remove(&self, engine_id: &EngineIdentifier) -> Result<(), StorageError>;
}
