//! Core services - the application's business logic layer.
//!
//! Services orchestrate between ports (trait interfaces) and domain logic.
//! They never know about concrete repository or engine implementations.

mod chat_core;
mod generation;
mod lifecycle;

pub use chat_core::ChatCore;
pub use generation::{
    CancelHandle, ERROR_MESSAGE_PREFIX, GenerationSession, GenerationStream, SessionError,
};
pub use lifecycle::{
    ActiveDownloadInfo, DownloadProgress, LifecycleError, LifecycleSnapshot, ModelEntry,
    ModelLifecycleManager,
};
