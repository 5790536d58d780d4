//! `ChatCore` - the primary application facade.
//!
//! This is the composition root for core services. A presentation layer
//! receives a `ChatCore` built with concrete repository and engine adapters
//! and uses it for every command it exposes.

use std::sync::Arc;

use super::generation::GenerationSession;
use super::lifecycle::ModelLifecycleManager;
use crate::chat::ChatTranscript;
use crate::domain::ModelCatalog;
use crate::ports::{AppEventEmitter, CoreError, InferenceEngine, ModelRepository, SessionParams};
use crate::settings::{MAX_OUTPUT_LENGTH_LIMIT, Settings, validate_settings};

/// The core application facade.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::new();
/// let mut events = bus.subscribe();
/// let core = ChatCore::new(
///     ModelCatalog::builtin(),
///     Arc::new(HttpModelRepository::from_settings(&settings)?),
///     engine,
///     Arc::new(bus),
///     settings,
/// )?;
///
/// core.lifecycle().refresh().await?;
/// let transcript = core.new_transcript();
/// let mut session = core.create_session(transcript, "llama-3.2-1b", None, None).await?;
/// ```
pub struct ChatCore {
    lifecycle: ModelLifecycleManager,
    engine: Arc<dyn InferenceEngine>,
    emitter: Arc<dyn AppEventEmitter>,
    settings: Settings,
}

impl ChatCore {
    /// Wire the core together. Fails if `settings` do not validate.
    pub fn new(
        catalog: ModelCatalog,
        repository: Arc<dyn ModelRepository>,
        engine: Arc<dyn InferenceEngine>,
        emitter: Arc<dyn AppEventEmitter>,
        settings: Settings,
    ) -> Result<Self, CoreError> {
        validate_settings(&settings)?;
        let lifecycle = ModelLifecycleManager::with_concurrency(
            Arc::new(catalog),
            repository,
            Arc::clone(&emitter),
            settings.effective_download_concurrency(),
        );
        Ok(Self {
            lifecycle,
            engine,
            emitter,
            settings,
        })
    }

    /// Access the lifecycle manager.
    pub const fn lifecycle(&self) -> &ModelLifecycleManager {
        &self.lifecycle
    }

    pub fn catalog(&self) -> &ModelCatalog {
        self.lifecycle.catalog()
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start an empty transcript that reports to the core's emitter.
    pub fn new_transcript(&self) -> ChatTranscript {
        ChatTranscript::with_emitter(Arc::clone(&self.emitter))
    }

    /// Open a generation session on `model_id`.
    ///
    /// `None` arguments fall back to the configured default system prompt
    /// and max output length.
    pub async fn create_session(
        &self,
        transcript: ChatTranscript,
        model_id: &str,
        system_prompt: Option<String>,
        max_output_length: Option<u32>,
    ) -> Result<GenerationSession, CoreError> {
        let max_output_length =
            max_output_length.unwrap_or_else(|| self.settings.effective_max_output_length());
        if max_output_length == 0 || max_output_length > MAX_OUTPUT_LENGTH_LIMIT {
            return Err(CoreError::Validation(format!(
                "max output length must be between 1 and {MAX_OUTPUT_LENGTH_LIMIT}, got {max_output_length}"
            )));
        }
        let params = SessionParams::new(
            system_prompt.or_else(|| self.settings.default_system_prompt.clone()),
            max_output_length,
        );

        let session = GenerationSession::create(
            &self.lifecycle,
            self.engine.as_ref(),
            transcript,
            model_id,
            params,
            Arc::clone(&self.emitter),
        )
        .await?;
        Ok(session)
    }

    /// Open a session on the currently selected model.
    pub async fn create_session_for_selected(
        &self,
        transcript: ChatTranscript,
    ) -> Result<GenerationSession, CoreError> {
        let selected = self
            .lifecycle
            .selected_model()
            .ok_or_else(|| CoreError::Validation("No model selected".to_string()))?;
        self.create_session(transcript, selected.id(), None, None)
            .await
    }
}
