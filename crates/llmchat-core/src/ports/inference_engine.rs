//! Inference engine port.
//!
//! The engine owns model weights, tokenization and sampling. The core only
//! opens a session, sends a prompt and pulls text fragments.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::EngineError;
use crate::domain::EngineIdentifier;

/// Lazy, finite sequence of generated text fragments.
pub type TokenStream = BoxStream<'static, Result<String, EngineError>>;

/// Parameters for opening an engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Optional system prompt prepended by the engine.
    pub system_prompt: Option<String>,
    /// Upper bound on generated tokens per reply.
    pub max_output_length: u32,
}

impl SessionParams {
    pub fn new(system_prompt: Option<String>, max_output_length: u32) -> Self {
        Self {
            system_prompt,
            max_output_length,
        }
    }
}

/// Factory for engine sessions bound to one model.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Load the model and open a session.
    ///
    /// Returns `EngineError::ModelLoad` if the weights cannot be loaded.
    async fn create_session(
        &self,
        engine_id: &EngineIdentifier,
        params: &SessionParams,
    ) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One live engine session.
#[async_trait]
pub trait EngineSession: Send {
    /// Submit the next user prompt.
    async fn send_prompt(&mut self, text: &str) -> Result<(), EngineError>;

    /// Stream the reply to the last prompt.
    ///
    /// The stream is not restartable: call once per prompt. It ends normally
    /// when the reply is complete, or with a single `Err` item.
    fn stream_tokens(&mut self) -> TokenStream;
}
