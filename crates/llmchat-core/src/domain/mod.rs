//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! infrastructure concerns (inference engine, filesystem, etc.).
//!
//! # Structure
//!
//! - `model` - Model descriptor types (`ModelDescriptor`, `EngineIdentifier`)
//! - `catalog` - The model catalog (`ModelCatalog`)
//! - `chat` - Chat message types

pub mod catalog;
pub mod chat;
mod model;

pub use catalog::{CatalogError, ModelCatalog};
pub use chat::{ChatMessage, MessageRole};
pub use model::{EngineIdentifier, ModelDescriptor};
