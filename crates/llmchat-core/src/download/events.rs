//! Download events - discriminated union for all download state changes.

use serde::{Deserialize, Serialize};

/// Single discriminated union for all download events.
///
/// Events for one download are emitted in the order they happen:
/// `download_queued`, then `download_started` on the first progress report,
/// any number of `download_progress`, and exactly one terminal event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A download was accepted and is waiting for its first progress report.
    DownloadQueued {
        /// Catalog id of the model.
        id: String,
    },

    /// The repository reported its first progress value.
    DownloadStarted {
        /// Catalog id of the model.
        id: String,
    },

    /// Progress update.
    DownloadProgress {
        /// Catalog id of the model.
        id: String,
        /// Fraction complete (0.0 - 1.0).
        fraction: f64,
    },

    /// Download completed successfully; the model is now present.
    DownloadCompleted {
        /// Catalog id of the model.
        id: String,
    },

    /// Download failed with an error.
    DownloadFailed {
        /// Catalog id of the model.
        id: String,
        /// Error message describing what went wrong.
        error: String,
    },

    /// Download was cancelled by the user.
    DownloadCancelled {
        /// Catalog id of the model.
        id: String,
    },
}

impl DownloadEvent {
    pub fn queued(id: impl Into<String>) -> Self {
        Self::DownloadQueued { id: id.into() }
    }

    pub fn started(id: impl Into<String>) -> Self {
        Self::DownloadStarted { id: id.into() }
    }

    pub fn progress(id: impl Into<String>, fraction: f64) -> Self {
        Self::DownloadProgress {
            id: id.into(),
            fraction,
        }
    }

    pub fn completed(id: impl Into<String>) -> Self {
        Self::DownloadCompleted { id: id.into() }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::DownloadFailed {
            id: id.into(),
            error: error.into(),
        }
    }

    pub fn cancelled(id: impl Into<String>) -> Self {
        Self::DownloadCancelled { id: id.into() }
    }

    /// Catalog id this event refers to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::DownloadQueued { id }
            | Self::DownloadStarted { id }
            | Self::DownloadProgress { id, .. }
            | Self::DownloadCompleted { id }
            | Self::DownloadFailed { id, .. }
            | Self::DownloadCancelled { id } => id,
        }
    }

    /// Whether this event ends a download.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DownloadCompleted { .. }
                | Self::DownloadFailed { .. }
                | Self::DownloadCancelled { .. }
        )
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::DownloadQueued { .. } => "download:queued",
            Self::DownloadStarted { .. } => "download:started",
            Self::DownloadProgress { .. } => "download:progress",
            Self::DownloadCompleted { .. } => "download:completed",
            Self::DownloadFailed { .. } => "download:failed",
            Self::DownloadCancelled { .. } => "download:cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&DownloadEvent::progress("m1", 0.25)).unwrap();
        assert!(json.contains("\"type\":\"download_progress\""));
        assert!(json.contains("\"fraction\":0.25"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(DownloadEvent::completed("m").is_terminal());
        assert!(DownloadEvent::failed("m", "boom").is_terminal());
        assert!(DownloadEvent::cancelled("m").is_terminal());
        assert!(!DownloadEvent::progress("m", 0.1).is_terminal());
        assert_eq!(DownloadEvent::failed("m", "boom").id(), "m");
    }
}
