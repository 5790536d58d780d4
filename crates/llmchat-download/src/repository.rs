//! HTTP-backed model repository.
//!
//! Artifacts are single files under the models directory, named after the
//! sanitized engine identifier. A fetch downloads `<base_url>/<engine id>`
//! into `<name>.part` and renames it into place once complete, so a present
//! file is always a complete one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use llmchat_core::ports::{ModelRepository, ProgressStream, StorageError};
use llmchat_core::{EngineIdentifier, PathError, Settings, resolve_models_dir};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::progress::ProgressThrottle;

const USER_AGENT: &str = concat!("llmchat/", env!("CARGO_PKG_VERSION"));
const PARTIAL_SUFFIX: &str = "part";

/// `ModelRepository` storing artifacts on the local filesystem and fetching
/// them over HTTP.
#[derive(Debug, Clone)]
pub struct HttpModelRepository {
    client: Client,
    base_url: String,
    models_dir: PathBuf,
    progress_interval: Duration,
}

impl HttpModelRepository {
    pub fn new(models_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models_dir: models_dir.into(),
            progress_interval: Duration::from_millis(
                llmchat_core::settings::DEFAULT_PROGRESS_INTERVAL_MS,
            ),
        }
    }

    /// Build from settings, resolving the models directory the usual way
    /// (settings, then `LLMCHAT_MODELS_DIR`, then the platform default).
    pub fn from_settings(settings: &Settings, base_url: impl Into<String>) -> Result<Self, PathError> {
        let resolved = resolve_models_dir(settings.models_dir.as_deref())?;
        debug!(path = %resolved.path.display(), source = ?resolved.source, "Resolved models directory");
        Ok(Self::new(resolved.path, base_url)
            .with_progress_interval(Duration::from_millis(settings.effective_progress_interval_ms())))
    }

    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Where the artifact for `engine_id` lives once downloaded.
    pub fn artifact_path(&self, engine_id: &EngineIdentifier) -> PathBuf {
        self.models_dir.join(file_name_for(engine_id))
    }

    fn partial_path(&self, engine_id: &EngineIdentifier) -> PathBuf {
        self.models_dir
            .join(format!("{}.{PARTIAL_SUFFIX}", file_name_for(engine_id)))
    }

    fn url_for(&self, engine_id: &EngineIdentifier) -> String {
        format!("{}/{}", self.base_url, engine_id.as_str())
    }
}

/// File-system safe name for an engine identifier.
fn file_name_for(engine_id: &EngineIdentifier) -> String {
    let name: String = engine_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "_".to_string()
    } else {
        name.to_string()
    }
}

/// Removes an unfinished `.part` file unless the download was committed.
///
/// Runs on drop, so the removal is a blocking unlink.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove partial download");
                }
            }
        }
    }
}

/// Map an adapter error onto the port's error type.
fn into_storage_error(err: anyhow::Error) -> StorageError {
    let err = match err.downcast::<StorageError>() {
        Ok(storage) => return storage,
        Err(err) => err,
    };
    let message = format!("{err:#}");
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        return StorageError::Io {
            kind: format!("{:?}", io.kind()),
            message,
        };
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        return StorageError::Network {
            status_code: http.status().map(|s| s.as_u16()),
            message,
        };
    }
    StorageError::Other(message)
}

#[async_trait]
impl ModelRepository for HttpModelRepository {
    async fn exists(&self, engine_id: &EngineIdentifier) -> Result<bool, StorageError> {
        fs::try_exists(self.artifact_path(engine_id))
            .await
            .map_err(|e| StorageError::from_io_error(&e))
    }

    fn fetch(&self, engine_id: &EngineIdentifier) -> ProgressStream {
        let client = self.client.clone();
        let url = self.url_for(engine_id);
        let dest = self.artifact_path(engine_id);
        let partial = self.partial_path(engine_id);
        let models_dir = self.models_dir.clone();
        let mut throttle = ProgressThrottle::new(self.progress_interval);

        let progress = try_stream! {
            info!(url = %url, dest = %dest.display(), "Starting model download");
            let response = client
                .get(&url)
                .header("User-Agent", USER_AGENT)
                .send()
                .await
                .context("Failed to start download")?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                Err::<(), _>(StorageError::NotFound(url.clone()))?;
            }
            if !status.is_success() {
                Err::<(), _>(StorageError::Network {
                    message: format!("Download failed: HTTP {status}"),
                    status_code: Some(status.as_u16()),
                })?;
            }

            let total = response.content_length().unwrap_or(0);
            fs::create_dir_all(&models_dir)
                .await
                .context("Failed to create models directory")?;
            let mut guard = PartialFile { path: partial.clone(), committed: false };
            let mut file = File::create(&guard.path)
                .await
                .context("Failed to create download file")?;

            throttle.should_report(0.0);
            yield 0.0;

            let mut downloaded: u64 = 0;
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.context("Error reading download stream")?;
                file.write_all(&chunk)
                    .await
                    .context("Error writing to download file")?;
                downloaded += chunk.len() as u64;

                if total > 0 {
                    #[allow(clippy::cast_precision_loss)]
                    let fraction = (downloaded as f64 / total as f64).min(1.0);
                    if fraction < 1.0 && throttle.should_report(fraction) {
                        yield fraction;
                    }
                }
            }

            file.flush().await.context("Error flushing download file")?;
            drop(file);

            if total > 0 && downloaded != total {
                Err::<(), _>(StorageError::network(format!(
                    "Download truncated: received {downloaded} of {total} bytes"
                )))?;
            }

            fs::rename(&partial, &dest)
                .await
                .context("Failed to move download into place")?;
            guard.committed = true;
            info!(dest = %dest.display(), bytes = downloaded, "Model download complete");
            yield 1.0;
        };

        Box::pin(progress.map(|item: Result<f64, anyhow::Error>| {
            item.map_err(|e| {
                let err = into_storage_error(e);
                warn!(error = %err, "Model download failed");
                err
            })
        }))
    }

    async fn remove(&self, engine_id: &EngineIdentifier) -> Result<(), StorageError> {
        for path in [self.artifact_path(engine_id), self.partial_path(engine_id)] {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed model file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::from_io_error(&e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_sanitized() {
        assert_eq!(
            file_name_for(&EngineIdentifier::new("llama3_2_1B_4bit")),
            "llama3_2_1B_4bit"
        );
        assert_eq!(
            file_name_for(&EngineIdentifier::new("org/model:q4")),
            "org_model_q4"
        );
        assert_eq!(file_name_for(&EngineIdentifier::new("../escape")), "_escape");
        assert_eq!(file_name_for(&EngineIdentifier::new("..")), "_");
    }

    #[test]
    fn test_paths_and_url() {
        let repo = HttpModelRepository::new("/models", "https://example.com/models/");
        let id = EngineIdentifier::new("phi3_5_mini_4bit");

        assert_eq!(
            repo.artifact_path(&id),
            PathBuf::from("/models/phi3_5_mini_4bit")
        );
        assert_eq!(
            repo.partial_path(&id),
            PathBuf::from("/models/phi3_5_mini_4bit.part")
        );
        assert_eq!(
            repo.url_for(&id),
            "https://example.com/models/phi3_5_mini_4bit"
        );
    }

    #[test]
    fn test_from_settings_uses_configured_dir() {
        let settings = Settings {
            models_dir: Some("/srv/models".into()),
            progress_interval_ms: Some(0),
            ..Settings::default()
        };
        let repo = HttpModelRepository::from_settings(&settings, "http://localhost").unwrap();
        assert_eq!(repo.models_dir(), Path::new("/srv/models"));
        assert_eq!(repo.progress_interval, Duration::ZERO);
    }

    #[test]
    fn test_storage_error_passthrough() {
        let err = anyhow::Error::new(StorageError::NotFound("x".into()));
        assert_eq!(into_storage_error(err), StorageError::NotFound("x".into()));

        let io = std::io::Error::new(ErrorKind::PermissionDenied, "denied");
        let err = anyhow::Error::new(io).context("Failed to create download file");
        match into_storage_error(err) {
            StorageError::Io { kind, message } => {
                assert_eq!(kind, "PermissionDenied");
                assert!(message.starts_with("Failed to create download file"));
            }
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }
}
