//! Conversation state: the transcript and generation status.

mod status;
mod transcript;

pub use status::GenerationStatus;
pub use transcript::{ChatTranscript, TranscriptError};

pub(crate) use status::TurnControl;
pub(crate) use transcript::TurnLease;
