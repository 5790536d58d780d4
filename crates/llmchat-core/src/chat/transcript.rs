//! Chat transcript.
//!
//! Append-only ordered log of messages. The only mutation besides appending
//! is replacing the last message with a newer one of the same role, which is
//! how a streaming assistant reply grows.
//!
//! While a generation turn is active the transcript has exactly one writer:
//! the session holding the turn lease. Public writes are rejected until the
//! turn ends or is cancelled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::status::TurnControl;
use crate::domain::{ChatMessage, MessageRole};
use crate::events::AppEvent;
use crate::ports::{AppEventEmitter, NoopEmitter};

/// Errors from transcript operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// `replace_last` on a transcript with no messages.
    #[error("Transcript is empty")]
    EmptyTranscript,

    /// `replace_last` with a message whose role differs from the last one.
    #[error("Cannot replace {expected} message with {found} message")]
    RoleMismatch {
        expected: MessageRole,
        found: MessageRole,
    },

    /// A generation session currently owns the transcript.
    #[error("A generation session is writing to this transcript")]
    SessionActive,

    /// The turn lease was invalidated by `clear()` or cancellation.
    #[error("Turn no longer owns the transcript")]
    Detached,
}

/// Identifies the turn currently allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TurnLease(u64);

struct ActiveTurn {
    lease: TurnLease,
    control: TurnControl,
}

impl ActiveTurn {
    /// A cancelled turn keeps its lease until its stream is dropped but no
    /// longer owns the transcript.
    fn is_live(&self) -> bool {
        !self.control.cancel.is_cancelled()
    }
}

#[derive(Default)]
struct TranscriptState {
    messages: Vec<ChatMessage>,
    active: Option<ActiveTurn>,
    next_lease: u64,
}

impl TranscriptState {
    fn is_owned(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveTurn::is_live)
    }
}

struct Shared {
    id: Uuid,
    state: Mutex<TranscriptState>,
    emitter: Arc<dyn AppEventEmitter>,
}

/// Shared handle to one conversation's transcript.
///
/// Cloning the handle does not copy the messages.
#[derive(Clone)]
pub struct ChatTranscript {
    shared: Arc<Shared>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChatTranscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTranscript")
            .field("id", &self.shared.id)
            .field("len", &self.len())
            .finish()
    }
}

impl ChatTranscript {
    /// Create an empty transcript that emits no events.
    pub fn new() -> Self {
        Self::with_emitter(Arc::new(NoopEmitter::new()))
    }

    /// Create an empty transcript reporting changes to `emitter`.
    pub fn with_emitter(emitter: Arc<dyn AppEventEmitter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                state: Mutex::new(TranscriptState::default()),
                emitter,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    fn lock(&self) -> MutexGuard<'_, TranscriptState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message.
    pub fn append(&self, message: ChatMessage) -> Result<(), TranscriptError> {
        let mut state = self.lock();
        if state.is_owned() {
            return Err(TranscriptError::SessionActive);
        }
        self.push(&mut state, message);
        Ok(())
    }

    /// Replace the last message with a newer one of the same role.
    pub fn replace_last(&self, message: ChatMessage) -> Result<(), TranscriptError> {
        let mut state = self.lock();
        if state.is_owned() {
            return Err(TranscriptError::SessionActive);
        }
        self.replace(&mut state, message)
    }

    /// Remove all messages.
    ///
    /// Any session writing to this transcript is forced to `Cancelled`.
    pub fn clear(&self) {
        let mut state = self.lock();
        if let Some(turn) = state.active.take() {
            debug!(
                transcript_id = %self.shared.id,
                session_id = %turn.control.session_id,
                "Clearing transcript with active session"
            );
            turn.control.cancel(self.shared.emitter.as_ref());
        }
        state.messages.clear();
        self.shared
            .emitter
            .emit(AppEvent::transcript_cleared(self.shared.id));
    }

    /// Read-only copy of the messages in order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.lock().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Whether a generation session currently owns the transcript.
    pub fn has_active_session(&self) -> bool {
        self.lock().is_owned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Turn-scoped writes (generation sessions only)
    // ─────────────────────────────────────────────────────────────────────

    /// Take exclusive write ownership for one turn.
    ///
    /// Returns `None` if another live turn already owns the transcript. A
    /// cancelled turn is replaced.
    pub(crate) fn claim(&self, control: TurnControl) -> Option<TurnLease> {
        let mut state = self.lock();
        if state.is_owned() {
            return None;
        }
        state.next_lease += 1;
        let lease = TurnLease(state.next_lease);
        state.active = Some(ActiveTurn { lease, control });
        Some(lease)
    }

    /// Give up ownership. Stale leases are ignored.
    pub(crate) fn release(&self, lease: TurnLease) {
        let mut state = self.lock();
        if state.active.as_ref().is_some_and(|turn| turn.lease == lease) {
            state.active = None;
        }
    }

    /// Append on behalf of the turn holding `lease`.
    pub(crate) fn append_for(
        &self,
        lease: TurnLease,
        message: ChatMessage,
    ) -> Result<(), TranscriptError> {
        let mut state = self.lock();
        Self::check_lease(&state, lease)?;
        self.push(&mut state, message);
        Ok(())
    }

    /// Publish the accumulated reply text of the turn holding `lease`.
    ///
    /// If the last message is the assistant message this turn produced
    /// (`current`), it is replaced; otherwise a new assistant message is
    /// appended. Returns the id of the message now carrying `text`.
    pub(crate) fn merge_reply(
        &self,
        lease: TurnLease,
        current: Option<Uuid>,
        text: &str,
    ) -> Result<Uuid, TranscriptError> {
        let mut state = self.lock();
        Self::check_lease(&state, lease)?;

        let message = ChatMessage::assistant(text);
        let id = message.id();
        let owns_last = current.is_some_and(|current| {
            state
                .messages
                .last()
                .is_some_and(|last| last.id() == current)
        });

        if owns_last {
            self.replace(&mut state, message)?;
        } else {
            self.push(&mut state, message);
        }
        Ok(id)
    }

    fn check_lease(state: &TranscriptState, lease: TurnLease) -> Result<(), TranscriptError> {
        match &state.active {
            Some(turn) if turn.lease == lease && turn.is_live() => Ok(()),
            _ => Err(TranscriptError::Detached),
        }
    }

    fn push(&self, state: &mut TranscriptState, message: ChatMessage) {
        state.messages.push(message.clone());
        self.shared
            .emitter
            .emit(AppEvent::message_appended(self.shared.id, message));
    }

    fn replace(
        &self,
        state: &mut TranscriptState,
        message: ChatMessage,
    ) -> Result<(), TranscriptError> {
        let last = state
            .messages
            .last_mut()
            .ok_or(TranscriptError::EmptyTranscript)?;
        if last.role() != message.role() {
            return Err(TranscriptError::RoleMismatch {
                expected: last.role(),
                found: message.role(),
            });
        }
        *last = message.clone();
        self.shared
            .emitter
            .emit(AppEvent::message_replaced(self.shared.id, message));
        Ok(())
    }
}
