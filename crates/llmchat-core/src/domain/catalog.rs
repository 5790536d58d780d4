//! Model catalog.
//!
//! Read-only registry mapping a stable model id to its descriptor. Listing
//! preserves insertion order. Unknown ids are always an error: the catalog
//! never substitutes a fallback model.

use indexmap::IndexMap;
use thiserror::Error;

use super::model::{EngineIdentifier, ModelDescriptor};

/// Errors that can occur during catalog operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The id is not in the catalog (configuration or version mismatch).
    #[error("Model not found in catalog: {id}")]
    NotFound { id: String },

    /// Two entries share the same id.
    #[error("Duplicate model id in catalog: {id}")]
    DuplicateId { id: String },

    /// A catalog document could not be parsed.
    #[error("Failed to parse catalog: {0}")]
    Parse(String),
}

/// Ordered, duplicate-free set of model descriptors.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: IndexMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(
        descriptors: impl IntoIterator<Item = ModelDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut entries = IndexMap::new();
        for descriptor in descriptors {
            let id = descriptor.id().to_string();
            if entries.contains_key(&id) {
                return Err(CatalogError::DuplicateId { id });
            }
            entries.insert(id, descriptor);
        }
        Ok(Self { entries })
    }

    /// Load a catalog from a JSON array of descriptors.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let descriptors: Vec<ModelDescriptor> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(descriptors)
    }

    /// The models shipped with the app.
    #[must_use]
    pub fn builtin() -> Self {
        let descriptors = [
            ModelDescriptor::new(
                "llama-3.2-1b",
                "Llama 3.2 1B",
                1_200_000_000,
                EngineIdentifier::new("llama3_2_1B_4bit"),
            )
            .with_description("Compact model, good for basic tasks"),
            ModelDescriptor::new(
                "phi-3-mini",
                "Phi-3 Mini",
                2_800_000_000,
                EngineIdentifier::new("phi3_5_mini_4bit"),
            )
            .with_description("Microsoft's efficient small model"),
            ModelDescriptor::new(
                "mistral-7b-q4",
                "Mistral 7B Q4",
                3_800_000_000,
                EngineIdentifier::new("mistral7B_4bit"),
            )
            .with_description("Powerful open model"),
            ModelDescriptor::new(
                "llama-3-8b",
                "Llama 3 8B",
                4_500_000_000,
                EngineIdentifier::new("llama3_8B_4bit"),
            )
            .with_description("Larger Llama model"),
            ModelDescriptor::new(
                "gemma-2b",
                "Gemma 2B",
                1_500_000_000,
                EngineIdentifier::new("gemma2B_4bit"),
            )
            .with_description("Google's efficient model"),
        ];

        // Ids above are distinct literals
        Self {
            entries: descriptors
                .into_iter()
                .map(|d| (d.id().to_string(), d))
                .collect(),
        }
    }

    /// All descriptors in insertion order.
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.entries.values().cloned().collect()
    }

    /// Iterate descriptors without cloning.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.entries.values()
    }

    /// Look up a descriptor by id.
    pub fn resolve(&self, id: &str) -> Result<&ModelDescriptor, CatalogError> {
        self.entries
            .get(id)
            .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ModelDescriptor {
        ModelDescriptor::new(id, id.to_uppercase(), 1, EngineIdentifier::new(id))
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let catalog =
            ModelCatalog::new([descriptor("b"), descriptor("a"), descriptor("c")]).unwrap();
        let ids: Vec<_> = catalog.list().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = ModelCatalog::new([descriptor("a"), descriptor("a")]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateId { id: "a".into() });
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let catalog = ModelCatalog::builtin();
        let err = catalog.resolve("does-not-exist").unwrap_err();
        assert_eq!(
            err,
            CatalogError::NotFound {
                id: "does-not-exist".into()
            }
        );
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.len(), 5);
        let llama = catalog.resolve("llama-3.2-1b").unwrap();
        assert_eq!(llama.display_name(), "Llama 3.2 1B");
        assert_eq!(llama.size_label(), "1.2 GB");
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"id": "m1", "displayName": "M1", "approximateSizeBytes": 10, "engineIdentifier": "e1"},
            {"id": "m2", "displayName": "M2", "approximateSizeBytes": 20, "engineIdentifier": "e2"}
        ]"#;
        let catalog = ModelCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.resolve("m2").unwrap().engine_identifier().as_str(),
            "e2"
        );
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            ModelCatalog::from_json("{not json"),
            Err(CatalogError::Parse(_))
        ));
    }
}
