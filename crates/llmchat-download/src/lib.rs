//! Filesystem + HTTP implementation of the `ModelRepository` port.
//!
//! # Structure
//!
//! - `repository` - `HttpModelRepository`, the adapter itself
//! - `progress` - `ProgressThrottle`, rate-limiting of progress fractions

// Re-export core port types for convenience
pub use llmchat_core::ports::{ModelRepository, ProgressStream, StorageError};

pub(crate) mod progress;
mod repository;

pub use progress::ProgressThrottle;
pub use repository::HttpModelRepository;
