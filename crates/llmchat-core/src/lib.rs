//! Core of the on-device chat app: model lifecycle and streaming generation.
//!
//! - `ModelLifecycleManager` owns download and selection state of the
//!   catalog models and drives an injected `ModelRepository`
//! - `GenerationSession` turns a prompt into a streamed assistant reply in a
//!   `ChatTranscript`, through an injected `InferenceEngine`
//! - `ChatCore` wires both together from `Settings`
//!
//! Every state change is reported as an `AppEvent` through an
//! `AppEventEmitter`; `EventBus` fans events out to subscribers in order.

pub mod chat;
pub mod domain;
pub mod download;
pub mod events;
pub mod paths;
pub mod ports;
pub mod services;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use chat::{ChatTranscript, GenerationStatus, TranscriptError};
pub use domain::{
    CatalogError, ChatMessage, EngineIdentifier, MessageRole, ModelCatalog, ModelDescriptor,
};
pub use download::{DownloadEvent, DownloadState};
pub use events::{AppEvent, EventBus};
pub use ports::{
    AppEventEmitter, CoreError, EngineError, EngineSession, InferenceEngine, ModelRepository,
    NoopEmitter, ProgressStream, SessionParams, StorageError, TokenStream,
};
pub use services::{
    ActiveDownloadInfo, CancelHandle, ChatCore, DownloadProgress, GenerationSession,
    GenerationStream, LifecycleError, LifecycleSnapshot, ModelEntry, ModelLifecycleManager,
    SessionError,
};
pub use settings::{
    DEFAULT_MAX_OUTPUT_LENGTH, DownloadConcurrency, Settings, SettingsError, SettingsUpdate,
    validate_settings,
};

// Re-export path utilities
pub use paths::{
    MODELS_DIR_ENV, ModelsDirResolution, ModelsDirSource, PathError, default_models_dir,
    resolve_models_dir,
};
