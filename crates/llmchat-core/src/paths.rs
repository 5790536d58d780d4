//! Models directory resolution.
//!
//! Provides utilities for resolving where model artifacts live from explicit
//! paths, environment variables, or platform defaults.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable overriding the models directory.
pub const MODELS_DIR_ENV: &str = "LLMCHAT_MODELS_DIR";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the user's home directory.
    #[error("Cannot determine home directory")]
    NoHomeDir,

    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,

    /// An empty path was provided.
    #[error("Path cannot be empty")]
    EmptyPath,
}

/// How the models directory was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelsDirSource {
    /// The caller passed an explicit path (settings or CLI flag).
    Explicit,
    /// The path came from `LLMCHAT_MODELS_DIR`.
    EnvVar,
    /// Platform default under the user data directory.
    Default,
}

/// Resolution result for the models directory.
#[derive(Debug, Clone)]
pub struct ModelsDirResolution {
    /// The resolved path to the models directory.
    pub path: PathBuf,
    /// How the path was determined.
    pub source: ModelsDirSource,
}

/// Return the platform-specific default models directory
/// (`<data dir>/llmchat/models`).
pub fn default_models_dir() -> Result<PathBuf, PathError> {
    let data = dirs::data_dir().ok_or(PathError::NoDataDir)?;
    Ok(data.join("llmchat").join("models"))
}

/// Resolve the models directory.
///
/// Resolution order:
/// 1. Explicit path provided by caller (highest priority)
/// 2. `LLMCHAT_MODELS_DIR` environment variable
/// 3. Default models directory
pub fn resolve_models_dir(explicit: Option<&str>) -> Result<ModelsDirResolution, PathError> {
    resolve_with_env(explicit, env::var(MODELS_DIR_ENV).ok().as_deref())
}

fn resolve_with_env(
    explicit: Option<&str>,
    env_value: Option<&str>,
) -> Result<ModelsDirResolution, PathError> {
    if let Some(path_str) = explicit {
        return Ok(ModelsDirResolution {
            path: normalize_user_path(path_str)?,
            source: ModelsDirSource::Explicit,
        });
    }

    if let Some(env_path) = env_value {
        if !env_path.trim().is_empty() {
            return Ok(ModelsDirResolution {
                path: normalize_user_path(env_path)?,
                source: ModelsDirSource::EnvVar,
            });
        }
    }

    Ok(ModelsDirResolution {
        path: default_models_dir()?,
        source: ModelsDirSource::Default,
    })
}

/// Expand a leading `~` and reject empty input.
fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    if let Some(rest) = trimmed.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        return Ok(home.join(rest));
    }
    if trimmed == "~" {
        return dirs::home_dir().ok_or(PathError::NoHomeDir);
    }

    Ok(PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins_over_env() {
        let resolved = resolve_with_env(Some("/tmp/explicit"), Some("/tmp/env")).unwrap();
        assert_eq!(resolved.source, ModelsDirSource::Explicit);
        assert_eq!(resolved.path, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn test_env_value_used() {
        let resolved = resolve_with_env(None, Some("/tmp/from-env")).unwrap();
        assert_eq!(resolved.source, ModelsDirSource::EnvVar);
        assert!(resolved.path.ends_with("from-env"));
    }

    #[test]
    fn test_blank_env_falls_back_to_default() {
        if let Ok(resolved) = resolve_with_env(None, Some("  ")) {
            assert_eq!(resolved.source, ModelsDirSource::Default);
            assert!(resolved.path.ends_with("llmchat/models"));
        }
    }

    #[test]
    fn test_empty_explicit_rejected() {
        assert!(matches!(
            resolve_with_env(Some(""), None),
            Err(PathError::EmptyPath)
        ));
    }
}
