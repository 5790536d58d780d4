//! Canonical event union for everything the core reports to the UI layer.
//!
//! # Structure
//!
//! - `bus` - `EventBus`, an ordered fan-out emitter with subscriptions
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "model_selected", "modelId": "llama-3.2-1b" }
//! ```

mod bus;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::GenerationStatus;
use crate::domain::ChatMessage;
use crate::download::DownloadEvent;

pub use bus::EventBus;

/// Canonical event types.
///
/// Each variant includes all necessary context for the event to be
/// self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Model Events ==========
    /// Download lifecycle + progress events.
    #[serde(rename = "download")]
    Download {
        /// The download event payload.
        event: DownloadEvent,
    },

    /// The selected model changed (`None` = selection cleared).
    ModelSelected {
        #[serde(rename = "modelId")]
        model_id: Option<String>,
    },

    /// A model's artifact was deleted from the device.
    ModelRemoved {
        #[serde(rename = "modelId")]
        model_id: String,
    },

    // ========== Transcript Events ==========
    /// A message was appended to a transcript.
    MessageAppended {
        #[serde(rename = "transcriptId")]
        transcript_id: Uuid,
        message: ChatMessage,
    },

    /// The last message of a transcript was replaced.
    MessageReplaced {
        #[serde(rename = "transcriptId")]
        transcript_id: Uuid,
        message: ChatMessage,
    },

    /// A transcript was cleared.
    TranscriptCleared {
        #[serde(rename = "transcriptId")]
        transcript_id: Uuid,
    },

    // ========== Generation Events ==========
    /// A generation session changed status.
    GenerationStatusChanged {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "modelId")]
        model_id: String,
        status: GenerationStatus,
    },
}

impl AppEvent {
    pub const fn download(event: DownloadEvent) -> Self {
        Self::Download { event }
    }

    pub const fn selection_changed(model_id: Option<String>) -> Self {
        Self::ModelSelected { model_id }
    }

    pub fn model_removed(model_id: impl Into<String>) -> Self {
        Self::ModelRemoved {
            model_id: model_id.into(),
        }
    }

    pub const fn message_appended(transcript_id: Uuid, message: ChatMessage) -> Self {
        Self::MessageAppended {
            transcript_id,
            message,
        }
    }

    pub const fn message_replaced(transcript_id: Uuid, message: ChatMessage) -> Self {
        Self::MessageReplaced {
            transcript_id,
            message,
        }
    }

    pub const fn transcript_cleared(transcript_id: Uuid) -> Self {
        Self::TranscriptCleared { transcript_id }
    }

    pub fn generation_status(
        session_id: Uuid,
        model_id: impl Into<String>,
        status: GenerationStatus,
    ) -> Self {
        Self::GenerationStatusChanged {
            session_id,
            model_id: model_id.into(),
            status,
        }
    }

    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Download { event } => event.event_name(),
            Self::ModelSelected { .. } => "model:selected",
            Self::ModelRemoved { .. } => "model:removed",
            Self::MessageAppended { .. } => "transcript:appended",
            Self::MessageReplaced { .. } => "transcript:replaced",
            Self::TranscriptCleared { .. } => "transcript:cleared",
            Self::GenerationStatusChanged { .. } => "generation:status",
        }
    }
}
