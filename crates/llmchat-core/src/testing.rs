//! Scripted port implementations for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::stream;
use async_trait::async_trait;

use crate::domain::EngineIdentifier;
use crate::events::AppEvent;
use crate::ports::{
    AppEventEmitter, EngineError, EngineSession, InferenceEngine, ModelRepository,
    ProgressStream, SessionParams, StorageError, TokenStream,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Emitter that records every event in order.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        lock(&self.events).clone()
    }

    /// Wire names of the recorded events.
    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(AppEvent::event_name).collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl AppEventEmitter for RecordingEmitter {
    fn emit(&self, event: AppEvent) {
        lock(&self.events).push(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model repository
// ─────────────────────────────────────────────────────────────────────────────

/// How a scripted fetch behaves.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Report each fraction, then succeed.
    Progress(Vec<f64>),
    /// Report each fraction, then fail.
    FailAfter(Vec<f64>, StorageError),
    /// Report each fraction, then never finish.
    Stall(Vec<f64>),
}

#[derive(Default)]
struct RepositoryState {
    scripts: HashMap<String, FetchScript>,
    stored: HashSet<String>,
    fetches: Vec<String>,
    removals: Vec<String>,
    remove_error: Option<StorageError>,
}

/// In-memory `ModelRepository` driven by per-artifact scripts.
///
/// Artifacts without a script download as `[0.0, 1.0]`.
#[derive(Clone, Default)]
pub struct ScriptedModelRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl ScriptedModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_script(self, engine_id: &str, script: FetchScript) -> Self {
        lock(&self.state)
            .scripts
            .insert(engine_id.to_string(), script);
        self
    }

    #[must_use]
    pub fn with_progress(self, engine_id: &str, steps: impl Into<Vec<f64>>) -> Self {
        self.with_script(engine_id, FetchScript::Progress(steps.into()))
    }

    /// Mark an artifact as already stored.
    #[must_use]
    pub fn with_stored(self, engine_id: &str) -> Self {
        lock(&self.state).stored.insert(engine_id.to_string());
        self
    }

    /// Make every subsequent `remove` fail.
    pub fn fail_removals(&self, error: StorageError) {
        lock(&self.state).remove_error = Some(error);
    }

    pub fn is_stored(&self, engine_id: &str) -> bool {
        lock(&self.state).stored.contains(engine_id)
    }

    /// Engine ids passed to `fetch`, in call order.
    pub fn fetches(&self) -> Vec<String> {
        lock(&self.state).fetches.clone()
    }

    /// Engine ids passed to `remove`, in call order.
    pub fn removals(&self) -> Vec<String> {
        lock(&self.state).removals.clone()
    }
}

#[async_trait]
impl ModelRepository for ScriptedModelRepository {
    async fn exists(&self, engine_id: &EngineIdentifier) -> Result<bool, StorageError> {
        Ok(lock(&self.state).stored.contains(engine_id.as_str()))
    }

    fn fetch(&self, engine_id: &EngineIdentifier) -> ProgressStream {
        let key = engine_id.as_str().to_string();
        let script = {
            let mut state = lock(&self.state);
            state.fetches.push(key.clone());
            state
                .scripts
                .get(&key)
                .cloned()
                .unwrap_or_else(|| FetchScript::Progress(vec![0.0, 1.0]))
        };
        let state = Arc::clone(&self.state);

        Box::pin(stream! {
            match script {
                FetchScript::Progress(steps) => {
                    for step in steps {
                        tokio::task::yield_now().await;
                        yield Ok(step);
                    }
                    lock(&state).stored.insert(key);
                }
                FetchScript::FailAfter(steps, error) => {
                    for step in steps {
                        tokio::task::yield_now().await;
                        yield Ok(step);
                    }
                    yield Err(error);
                }
                FetchScript::Stall(steps) => {
                    for step in steps {
                        yield Ok(step);
                    }
                    futures_util::future::pending::<()>().await;
                }
            }
        })
    }

    async fn remove(&self, engine_id: &EngineIdentifier) -> Result<(), StorageError> {
        let mut state = lock(&self.state);
        state.removals.push(engine_id.as_str().to_string());
        if let Some(error) = state.remove_error.clone() {
            return Err(error);
        }
        state.stored.remove(engine_id.as_str());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inference engine
// ─────────────────────────────────────────────────────────────────────────────

/// How the engine answers one prompt.
#[derive(Debug, Clone)]
pub enum ReplyScript {
    /// Stream each fragment, then finish.
    Tokens(Vec<String>),
    /// Stream each fragment, then fail.
    FailAfter(Vec<String>, EngineError),
    /// Stream each fragment, then never finish.
    Stall(Vec<String>),
    /// Reject the prompt itself.
    RejectPrompt(EngineError),
}

impl ReplyScript {
    pub fn tokens<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Self {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    pub fn stall<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Self {
        Self::Stall(tokens.into_iter().map(Into::into).collect())
    }

    pub fn fail_after<S: Into<String>>(
        tokens: impl IntoIterator<Item = S>,
        error: EngineError,
    ) -> Self {
        Self::FailAfter(tokens.into_iter().map(Into::into).collect(), error)
    }
}

#[derive(Default)]
struct EngineState {
    replies: VecDeque<ReplyScript>,
    load_error: Option<EngineError>,
    opened: Vec<(String, SessionParams)>,
    prompts: Vec<String>,
}

/// `InferenceEngine` that answers prompts from a queue of scripts.
///
/// Prompts beyond the queue get an empty reply.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<EngineState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next prompt.
    #[must_use]
    pub fn reply(self, script: ReplyScript) -> Self {
        lock(&self.state).replies.push_back(script);
        self
    }

    /// Make `create_session` fail.
    #[must_use]
    pub fn fail_load(self, error: EngineError) -> Self {
        lock(&self.state).load_error = Some(error);
        self
    }

    /// Engine ids and parameters of every opened session.
    pub fn opened(&self) -> Vec<(String, SessionParams)> {
        lock(&self.state).opened.clone()
    }

    /// Every prompt received, across sessions.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.state).prompts.clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn create_session(
        &self,
        engine_id: &EngineIdentifier,
        params: &SessionParams,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.load_error.clone() {
            return Err(error);
        }
        state
            .opened
            .push((engine_id.as_str().to_string(), params.clone()));
        Ok(Box::new(ScriptedEngineSession {
            engine: Arc::clone(&self.state),
            next: None,
        }))
    }
}

struct ScriptedEngineSession {
    engine: Arc<Mutex<EngineState>>,
    next: Option<ReplyScript>,
}

#[async_trait]
impl EngineSession for ScriptedEngineSession {
    async fn send_prompt(&mut self, text: &str) -> Result<(), EngineError> {
        let script = {
            let mut state = lock(&self.engine);
            state.prompts.push(text.to_string());
            state
                .replies
                .pop_front()
                .unwrap_or(ReplyScript::Tokens(Vec::new()))
        };
        if let ReplyScript::RejectPrompt(error) = script {
            return Err(error);
        }
        self.next = Some(script);
        Ok(())
    }

    fn stream_tokens(&mut self) -> TokenStream {
        let script = self.next.take().unwrap_or(ReplyScript::Tokens(Vec::new()));
        Box::pin(stream! {
            match script {
                ReplyScript::Tokens(tokens) => {
                    for token in tokens {
                        tokio::task::yield_now().await;
                        yield Ok(token);
                    }
                }
                ReplyScript::FailAfter(tokens, error) => {
                    for token in tokens {
                        tokio::task::yield_now().await;
                        yield Ok(token);
                    }
                    yield Err(error);
                }
                ReplyScript::Stall(tokens) => {
                    for token in tokens {
                        yield Ok(token);
                    }
                    futures_util::future::pending::<()>().await;
                }
                ReplyScript::RejectPrompt(error) => yield Err(error),
            }
        })
    }
}
