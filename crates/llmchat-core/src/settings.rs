//! Settings domain types and validation.
//!
//! This module contains the core settings types used across the application.
//! These are pure domain types; loading from disk is a thin serde wrapper.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default cap on generated tokens per reply.
pub const DEFAULT_MAX_OUTPUT_LENGTH: u32 = 512;

/// Largest accepted `max_output_length`.
pub const MAX_OUTPUT_LENGTH_LIMIT: u32 = 32_768;

/// Default minimum interval between repository progress reports.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;

/// How many downloads may run at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadConcurrency {
    /// One download process-wide; a second request fails with
    /// `DownloadInProgress`.
    #[default]
    Single,
    /// Different models may download at the same time; the same model never
    /// downloads twice.
    PerModel,
}

/// Application settings structure.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Download concurrency policy.
    pub download_concurrency: Option<DownloadConcurrency>,

    /// System prompt used when a session is created without one.
    pub default_system_prompt: Option<String>,

    /// Default cap on generated tokens per reply.
    pub max_output_length: Option<u32>,

    /// Directory where model artifacts are stored.
    pub models_dir: Option<String>,

    /// Minimum interval between progress reports from the repository.
    pub progress_interval_ms: Option<u64>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            download_concurrency: Some(DownloadConcurrency::Single),
            default_system_prompt: None,
            max_output_length: Some(DEFAULT_MAX_OUTPUT_LENGTH),
            models_dir: None,
            progress_interval_ms: Some(DEFAULT_PROGRESS_INTERVAL_MS),
        }
    }

    /// Load settings from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let settings: Self =
            serde_json::from_str(&raw).map_err(|e| SettingsError::Parse(e.to_string()))?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    #[must_use]
    pub fn effective_download_concurrency(&self) -> DownloadConcurrency {
        self.download_concurrency.unwrap_or_default()
    }

    #[must_use]
    pub fn effective_max_output_length(&self) -> u32 {
        self.max_output_length.unwrap_or(DEFAULT_MAX_OUTPUT_LENGTH)
    }

    #[must_use]
    pub fn effective_progress_interval_ms(&self) -> u64 {
        self.progress_interval_ms
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL_MS)
    }

    /// Merge another settings into this one, only updating fields that are Some.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref concurrency) = other.download_concurrency {
            self.download_concurrency = *concurrency;
        }
        if let Some(ref prompt) = other.default_system_prompt {
            self.default_system_prompt.clone_from(prompt);
        }
        if let Some(ref length) = other.max_output_length {
            self.max_output_length = *length;
        }
        if let Some(ref dir) = other.models_dir {
            self.models_dir.clone_from(dir);
        }
        if let Some(ref interval) = other.progress_interval_ms {
            self.progress_interval_ms = *interval;
        }
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = set field to None/null
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub download_concurrency: Option<Option<DownloadConcurrency>>,
    pub default_system_prompt: Option<Option<String>>,
    pub max_output_length: Option<Option<u32>>,
    pub models_dir: Option<Option<String>>,
    pub progress_interval_ms: Option<Option<u64>>,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Max output length must be between 1 and 32768, got {0}")]
    InvalidMaxOutputLength(u32),

    #[error("Models directory cannot be empty")]
    EmptyModelsDir,

    #[error("Progress interval must be at most 10000 ms, got {0}")]
    InvalidProgressInterval(u64),

    #[error("Failed to read settings file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if let Some(length) = settings.max_output_length {
        if length == 0 || length > MAX_OUTPUT_LENGTH_LIMIT {
            return Err(SettingsError::InvalidMaxOutputLength(length));
        }
    }

    if let Some(ref dir) = settings.models_dir {
        if dir.trim().is_empty() {
            return Err(SettingsError::EmptyModelsDir);
        }
    }

    if let Some(interval) = settings.progress_interval_ms {
        if interval > 10_000 {
            return Err(SettingsError::InvalidProgressInterval(interval));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::with_defaults();
        assert_eq!(
            settings.effective_download_concurrency(),
            DownloadConcurrency::Single
        );
        assert_eq!(settings.effective_max_output_length(), 512);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_empty_settings_fall_back() {
        let settings = Settings::default();
        assert_eq!(settings.effective_max_output_length(), 512);
        assert_eq!(settings.effective_progress_interval_ms(), 100);
    }

    #[test]
    fn test_validate_max_output_length() {
        let mut settings = Settings::default();
        settings.max_output_length = Some(0);
        assert_eq!(
            validate_settings(&settings),
            Err(SettingsError::InvalidMaxOutputLength(0))
        );

        settings.max_output_length = Some(MAX_OUTPUT_LENGTH_LIMIT + 1);
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_validate_models_dir() {
        let settings = Settings {
            models_dir: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(
            validate_settings(&settings),
            Err(SettingsError::EmptyModelsDir)
        );
    }

    #[test]
    fn test_merge_settings() {
        let mut settings = Settings::with_defaults();
        let update = SettingsUpdate {
            download_concurrency: Some(Some(DownloadConcurrency::PerModel)),
            default_system_prompt: Some(Some("Be brief.".into())),
            max_output_length: None,
            ..Default::default()
        };
        settings.merge(&update);

        assert_eq!(
            settings.download_concurrency,
            Some(DownloadConcurrency::PerModel)
        );
        assert_eq!(settings.default_system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(settings.max_output_length, Some(512));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"download_concurrency": "per_model", "max_output_length": 1024}}"#
        )
        .unwrap();

        let settings = Settings::from_json_file(file.path()).unwrap();
        assert_eq!(
            settings.effective_download_concurrency(),
            DownloadConcurrency::PerModel
        );
        assert_eq!(settings.effective_max_output_length(), 1024);
        assert_eq!(settings.default_system_prompt, None);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_output_length": 0}}"#).unwrap();

        assert_eq!(
            Settings::from_json_file(file.path()),
            Err(SettingsError::InvalidMaxOutputLength(0))
        );
    }
}
