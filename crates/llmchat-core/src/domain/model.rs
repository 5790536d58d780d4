//! Model descriptor types.
//!
//! A `ModelDescriptor` is the immutable catalog entry for one on-device model.
//! The `EngineIdentifier` inside it is opaque to the core and only meaningful
//! to the external inference engine and model repository.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle understood only by the inference engine and repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineIdentifier(String);

impl EngineIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog entry describing a downloadable, selectable model.
///
/// Immutable once constructed; other components refer to it by `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    id: String,
    display_name: String,
    approximate_size_bytes: u64,
    engine_identifier: EngineIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ModelDescriptor {
    /// Create a new descriptor.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        approximate_size_bytes: u64,
        engine_identifier: EngineIdentifier,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            approximate_size_bytes,
            engine_identifier,
            description: None,
        }
    }

    /// Attach a short human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stable, unique catalog id (e.g. `llama-3.2-1b`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub const fn approximate_size_bytes(&self) -> u64 {
        self.approximate_size_bytes
    }

    #[must_use]
    pub const fn engine_identifier(&self) -> &EngineIdentifier {
        &self.engine_identifier
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Approximate size formatted for display, e.g. `1.2 GB` or `850 MB`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_label(&self) -> String {
        const GB: u64 = 1_000_000_000;
        const MB: u64 = 1_000_000;

        if self.approximate_size_bytes >= GB {
            format!("{:.1} GB", self.approximate_size_bytes as f64 / GB as f64)
        } else {
            format!("{} MB", self.approximate_size_bytes / MB)
        }
    }
}
