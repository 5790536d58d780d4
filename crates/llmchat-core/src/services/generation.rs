//! Streaming generation session.
//!
//! A session wraps one engine session bound to one model and turns each
//! prompt into a growing assistant reply in a `ChatTranscript`.
//!
//! Protocol per turn, strictly sequential:
//!
//! 1. `send(prompt)` appends the user message and moves to `Sending`
//! 2. `generate()` returns the lazy delta stream; pulling it merges each
//!    delta into the transcript and moves to `Streaming`, then `Completed`
//! 3. `cancel()` (or a `CancelHandle`, or `ChatTranscript::clear`) ends the
//!    turn as `Cancelled` at the next suspension point, keeping partial text
//!
//! Engine failures end the turn as `Failed` and append one assistant message
//! carrying the error text.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};

use async_stream::stream;
use futures_util::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::{GenerationLease, LifecycleError, ModelLifecycleManager};
use crate::chat::{ChatTranscript, GenerationStatus, TranscriptError, TurnControl, TurnLease};
use crate::domain::{ChatMessage, ModelDescriptor};
use crate::ports::{AppEventEmitter, EngineError, EngineSession, InferenceEngine, SessionParams};

/// Prefix of the assistant message recording a failed turn.
pub const ERROR_MESSAGE_PREFIX: &str = "Error: ";

/// Errors from generation session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The model is unknown or not on the device.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A turn is already active on this session or its transcript.
    #[error("A generation is already in progress")]
    SessionBusy,

    /// `generate()` without a preceding successful `send()`.
    #[error("No prompt is waiting for a reply")]
    NoPendingPrompt,

    /// The turn was cancelled before the engine accepted the prompt or
    /// before `generate()` was called.
    #[error("Generation was cancelled")]
    Cancelled,

    /// The engine failed to load, accept the prompt or stream the reply.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Lazy stream of reply deltas for one turn.
pub type GenerationStream = BoxStream<'static, Result<String, SessionError>>;

/// Cancels the current turn of a session from another task.
#[derive(Clone)]
pub struct CancelHandle {
    current: Arc<Mutex<Option<TurnControl>>>,
    emitter: Arc<dyn AppEventEmitter>,
}

impl CancelHandle {
    /// Cancel the running turn. Returns false if no turn was active.
    pub fn cancel(&self) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .is_some_and(|control| control.cancel(self.emitter.as_ref()))
    }
}

/// One prompt/reply exchange.
///
/// Owns the transcript lease and the model's generation lease. Dropping an
/// unfinished turn cancels it.
struct Turn {
    control: TurnControl,
    lease: TurnLease,
    transcript: ChatTranscript,
    emitter: Arc<dyn AppEventEmitter>,
    _model: GenerationLease,
    reply: Option<Uuid>,
    text: String,
}

impl Turn {
    fn transition(&self, next: GenerationStatus) -> bool {
        self.control.transition(next, self.emitter.as_ref())
    }

    fn merge_delta(&mut self, delta: &str) -> Result<(), TranscriptError> {
        self.text.push_str(delta);
        let id = self
            .transcript
            .merge_reply(self.lease, self.reply, &self.text)?;
        self.reply = Some(id);
        Ok(())
    }

    fn fail(&self, reason: &str) {
        if !self.transition(GenerationStatus::Failed {
            reason: reason.to_string(),
        }) {
            return;
        }
        warn!(
            session_id = %self.control.session_id,
            model_id = %self.control.model_id,
            error = %reason,
            "Generation failed"
        );
        let message = ChatMessage::assistant(format!("{ERROR_MESSAGE_PREFIX}{reason}"));
        if let Err(e) = self.transcript.append_for(self.lease, message) {
            debug!(error = %e, "Could not record generation failure in transcript");
        }
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if self.transition(GenerationStatus::Cancelled) {
            debug!(session_id = %self.control.session_id, "Unfinished turn dropped");
        }
        self.transcript.release(self.lease);
    }
}

/// Generation session bound to one downloaded model and one transcript.
pub struct GenerationSession {
    id: Uuid,
    descriptor: ModelDescriptor,
    params: SessionParams,
    lifecycle: ModelLifecycleManager,
    transcript: ChatTranscript,
    engine: Box<dyn EngineSession>,
    emitter: Arc<dyn AppEventEmitter>,
    status: Arc<watch::Sender<GenerationStatus>>,
    /// Number of the turn allowed to write `status`.
    current_turn: Arc<AtomicU64>,
    turns: u64,
    current: Arc<Mutex<Option<TurnControl>>>,
    pending: Option<Turn>,
}

impl std::fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSession")
            .field("id", &self.id)
            .field("model_id", &self.descriptor.id())
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl GenerationSession {
    /// Open a session on a downloaded model.
    ///
    /// Fails with `ModelNotDownloaded` unless the model is Present, whatever
    /// the current selection is.
    pub async fn create(
        lifecycle: &ModelLifecycleManager,
        engine: &dyn InferenceEngine,
        transcript: ChatTranscript,
        model_id: &str,
        params: SessionParams,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Result<Self, SessionError> {
        let descriptor = lifecycle.require_present(model_id)?;
        let engine_session = engine
            .create_session(descriptor.engine_identifier(), &params)
            .await
            .inspect_err(|e| warn!(model_id = %model_id, error = %e, "Failed to open engine session"))?;

        let id = Uuid::new_v4();
        info!(
            session_id = %id,
            model_id = %model_id,
            max_output_length = params.max_output_length,
            "Generation session created"
        );

        Ok(Self {
            id,
            descriptor,
            params,
            lifecycle: lifecycle.clone(),
            transcript,
            engine: engine_session,
            emitter,
            status: Arc::new(watch::channel(GenerationStatus::Idle).0),
            current_turn: Arc::new(AtomicU64::new(0)),
            turns: 0,
            current: Arc::new(Mutex::new(None)),
            pending: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn status(&self) -> GenerationStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn status_watch(&self) -> watch::Receiver<GenerationStatus> {
        self.status.subscribe()
    }

    /// Handle that cancels whichever turn is running when it is used.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            current: Arc::clone(&self.current),
            emitter: Arc::clone(&self.emitter),
        }
    }

    /// Cancel the running turn. Returns false if no turn was active.
    pub fn cancel(&self) -> bool {
        self.cancel_handle().cancel()
    }

    /// Append the user prompt and hand it to the engine.
    pub async fn send(&mut self, prompt: &str) -> Result<(), SessionError> {
        if self.status.borrow().is_active() {
            return Err(SessionError::SessionBusy);
        }
        // A turn cancelled before generate() was called
        self.pending = None;

        self.turns += 1;
        let control = TurnControl {
            session_id: self.id,
            model_id: self.descriptor.id().to_string(),
            turn: self.turns,
            current_turn: Arc::clone(&self.current_turn),
            cancel: CancellationToken::new(),
            status: Arc::clone(&self.status),
        };
        let lease = self
            .transcript
            .claim(control.clone())
            .ok_or(SessionError::SessionBusy)?;
        let model = match self.lifecycle.acquire_generation(self.descriptor.id()) {
            Ok(model) => model,
            Err(e) => {
                self.transcript.release(lease);
                return Err(e.into());
            }
        };

        control.begin(self.emitter.as_ref());
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(control.clone());

        let turn = Turn {
            control,
            lease,
            transcript: self.transcript.clone(),
            emitter: Arc::clone(&self.emitter),
            _model: model,
            reply: None,
            text: String::new(),
        };
        if let Err(e) = self.transcript.append_for(lease, ChatMessage::user(prompt)) {
            debug!(session_id = %self.id, error = %e, "Transcript detached before prompt");
            return Err(SessionError::Cancelled);
        }
        debug!(session_id = %self.id, prompt_len = prompt.len(), "Prompt sent");

        let cancel = turn.control.cancel.clone();
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            sent = self.engine.send_prompt(prompt) => sent,
        };

        match sent {
            Ok(()) => {
                self.pending = Some(turn);
                Ok(())
            }
            Err(e) => {
                turn.fail(e.reason());
                Err(e.into())
            }
        }
    }

    /// Stream the reply to the last prompt.
    ///
    /// The stream is lazy and not restartable. It ends when the reply is
    /// complete or the turn is cancelled, or after a single `Err` item when
    /// the engine fails. Dropping it early cancels the turn.
    pub fn generate(&mut self) -> Result<GenerationStream, SessionError> {
        let Some(turn) = self.pending.take() else {
            return Err(if self.status.borrow().is_active() {
                SessionError::SessionBusy
            } else {
                SessionError::NoPendingPrompt
            });
        };
        if turn.control.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let cancel = turn.control.cancel.clone();
        let mut tokens = self.engine.stream_tokens();

        let deltas = stream! {
            let mut turn = turn;
            loop {
                let step = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    next = tokens.next() => Some(next),
                };

                match step {
                    None => {
                        turn.transition(GenerationStatus::Cancelled);
                        info!(session_id = %turn.control.session_id, "Generation cancelled");
                        break;
                    }
                    Some(Some(Ok(delta))) => {
                        if delta.is_empty() {
                            continue;
                        }
                        turn.transition(GenerationStatus::Streaming);
                        if let Err(e) = turn.merge_delta(&delta) {
                            debug!(error = %e, "Turn lost the transcript");
                            turn.transition(GenerationStatus::Cancelled);
                            break;
                        }
                        yield Ok(delta);
                    }
                    Some(Some(Err(e))) => {
                        turn.fail(e.reason());
                        drop(turn);
                        yield Err(SessionError::Engine(e));
                        break;
                    }
                    Some(None) => {
                        if turn.transition(GenerationStatus::Completed) {
                            info!(
                                session_id = %turn.control.session_id,
                                reply_len = turn.text.len(),
                                "Generation completed"
                            );
                        }
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(deltas))
    }
}
