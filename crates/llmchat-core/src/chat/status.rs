//! Generation status and the per-turn control block shared between a
//! session and the transcript it writes to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::AppEvent;
use crate::ports::AppEventEmitter;

/// Status of a generation session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Cancelled,
    Failed {
        reason: String,
    },
}

impl GenerationStatus {
    /// Sending or Streaming.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Completed, Cancelled or Failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed { .. }
        )
    }
}

/// Handles needed to stop one turn from outside the session.
///
/// The transcript keeps a copy while the turn owns it so that `clear()` can
/// force the session to `Cancelled`.
///
/// All turns of a session share its status sender. Only the turn whose
/// number matches `current_turn` may write to it.
#[derive(Clone)]
pub(crate) struct TurnControl {
    pub session_id: Uuid,
    pub model_id: String,
    pub turn: u64,
    pub current_turn: Arc<AtomicU64>,
    pub cancel: CancellationToken,
    pub status: Arc<watch::Sender<GenerationStatus>>,
}

impl TurnControl {
    /// Make this the session's current turn and move it to `Sending`.
    pub fn begin(&self, emitter: &dyn AppEventEmitter) {
        self.status.send_modify(|current| {
            self.current_turn.store(self.turn, Ordering::SeqCst);
            *current = GenerationStatus::Sending;
        });
        emitter.emit(AppEvent::generation_status(
            self.session_id,
            self.model_id.clone(),
            GenerationStatus::Sending,
        ));
    }

    fn is_current(&self) -> bool {
        self.current_turn.load(Ordering::SeqCst) == self.turn
    }

    /// Move an active turn to `next`.
    ///
    /// Returns false (and changes nothing) if the status already left the
    /// active states, so the first terminal transition wins, or if a later
    /// turn of the session has started.
    pub fn transition(&self, next: GenerationStatus, emitter: &dyn AppEventEmitter) -> bool {
        let event_status = next.clone();
        let changed = self.status.send_if_modified(|current| {
            if self.is_current() && current.is_active() && *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            emitter.emit(AppEvent::generation_status(
                self.session_id,
                self.model_id.clone(),
                event_status,
            ));
        }
        changed
    }

    /// Force the turn to `Cancelled` and signal its token.
    ///
    /// Returns false if the turn had already finished.
    pub fn cancel(&self, emitter: &dyn AppEventEmitter) -> bool {
        let changed = self.transition(GenerationStatus::Cancelled, emitter);
        self.cancel.cancel();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NoopEmitter;

    fn control(initial: GenerationStatus) -> TurnControl {
        let (tx, _rx) = watch::channel(initial);
        TurnControl {
            session_id: Uuid::new_v4(),
            model_id: "m".into(),
            turn: 1,
            current_turn: Arc::new(AtomicU64::new(1)),
            cancel: CancellationToken::new(),
            status: Arc::new(tx),
        }
    }

    fn next_turn(previous: &TurnControl) -> TurnControl {
        TurnControl {
            turn: previous.turn + 1,
            cancel: CancellationToken::new(),
            ..previous.clone()
        }
    }

    #[test]
    fn test_active_and_terminal() {
        assert!(GenerationStatus::Sending.is_active());
        assert!(GenerationStatus::Streaming.is_active());
        assert!(!GenerationStatus::Idle.is_active());
        assert!(!GenerationStatus::Idle.is_terminal());
        assert!(
            GenerationStatus::Failed {
                reason: "x".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_first_terminal_transition_wins() {
        let control = control(GenerationStatus::Streaming);
        let emitter = NoopEmitter::new();

        assert!(control.transition(GenerationStatus::Cancelled, &emitter));
        assert!(!control.transition(GenerationStatus::Completed, &emitter));
        assert_eq!(*control.status.borrow(), GenerationStatus::Cancelled);
    }

    #[test]
    fn test_cancel_signals_token() {
        let control = control(GenerationStatus::Sending);
        assert!(control.cancel(&NoopEmitter::new()));
        assert!(control.cancel.is_cancelled());
        assert!(!control.cancel(&NoopEmitter::new()));
        assert_eq!(*control.status.borrow(), GenerationStatus::Cancelled);
    }

    #[test]
    fn test_superseded_turn_cannot_write_status() {
        let emitter = NoopEmitter::new();
        let first = control(GenerationStatus::Streaming);
        assert!(first.cancel(&emitter));

        let second = next_turn(&first);
        second.begin(&emitter);
        assert_eq!(*second.status.borrow(), GenerationStatus::Sending);

        // Late writes from the cancelled turn are ignored
        assert!(!first.transition(GenerationStatus::Cancelled, &emitter));
        assert!(!first.cancel(&emitter));
        assert_eq!(*second.status.borrow(), GenerationStatus::Sending);

        assert!(second.transition(GenerationStatus::Completed, &emitter));
        assert_eq!(*first.status.borrow(), GenerationStatus::Completed);
    }
}
