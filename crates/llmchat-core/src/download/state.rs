//! Per-model download state.

use serde::{Deserialize, Serialize};

/// Lifecycle status of one model's on-device artifact.
///
/// Transitions (driven only by the lifecycle manager):
///
/// ```text
/// NotPresent --download--> Queued --first progress--> InProgress --done--> Present
/// InProgress --error--> Failed --download--> Queued
/// Present --delete--> NotPresent
/// Queued | InProgress --cancel--> NotPresent
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotPresent,
    Queued,
    InProgress {
        /// Fraction complete in `[0.0, 1.0]`, non-decreasing within one download.
        fraction: f64,
    },
    Present,
    Failed {
        reason: String,
    },
}

impl DownloadState {
    /// Whether a download currently occupies this model (Queued or `InProgress`).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress { .. })
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Fraction complete if a download is running.
    #[must_use]
    pub const fn fraction(&self) -> Option<f64> {
        match self {
            Self::Queued => Some(0.0),
            Self::InProgress { fraction } => Some(*fraction),
            _ => None,
        }
    }

    /// Short machine-readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotPresent => "not_present",
            Self::Queued => "queued",
            Self::InProgress { .. } => "in_progress",
            Self::Present => "present",
            Self::Failed { .. } => "failed",
        }
    }
}
