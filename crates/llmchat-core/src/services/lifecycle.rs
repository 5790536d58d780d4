//! Model lifecycle manager.
//!
//! Owns the download and selection state of every catalog model and drives
//! the injected `ModelRepository`.
//!
//! # Concurrency Model
//!
//! - All state lives behind one mutex; critical sections never await
//! - A download is a lazy stream; pulling it drives the repository forward
//! - Lease ids stop a stale stream (cancelled, replaced) from committing
//! - Lock order: lifecycle state → event emitter

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_stream::stream;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{ModelCatalog, ModelDescriptor};
use crate::download::{DownloadEvent, DownloadState};
use crate::events::AppEvent;
use crate::ports::{AppEventEmitter, ModelRepository, StorageError};
use crate::settings::DownloadConcurrency;

/// Errors from lifecycle operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The id is not in the catalog.
    #[error("Unknown model: {id}")]
    NotFound { id: String },

    /// Another download occupies the download slot.
    #[error("Download already in progress: {active}")]
    DownloadInProgress { active: String },

    /// The model's artifact is not on the device.
    #[error("Model is not downloaded: {id}")]
    ModelNotDownloaded { id: String },

    /// The model is being generated against (or is being deleted).
    #[error("Model is in use: {id}")]
    ModelInUse { id: String },

    /// The repository reported a failure while fetching.
    #[error("Download of {id} failed: {reason}")]
    DownloadFailed { id: String, reason: String },

    /// The download was cancelled before it completed.
    #[error("Download of {id} was cancelled")]
    Cancelled { id: String },

    /// Storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A catalog model joined with its current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub descriptor: ModelDescriptor,
    pub state: DownloadState,
    pub selected: bool,
}

/// Progress of one running download.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDownloadInfo {
    pub model_id: String,
    pub fraction: f64,
}

/// Pollable view of everything the lifecycle manager owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSnapshot {
    pub models: Vec<ModelEntry>,
    pub selected: Option<String>,
    pub active_downloads: Vec<ActiveDownloadInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LeaseId(u64);

struct ActiveDownload {
    lease: LeaseId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct LifecycleState {
    /// Missing entries are `NotPresent`.
    downloads: HashMap<String, DownloadState>,
    /// Bumped on every write to `downloads`, per model.
    revisions: HashMap<String, u64>,
    selected: Option<String>,
    active: HashMap<String, ActiveDownload>,
    /// Number of generation leases per model.
    generating: HashMap<String, usize>,
    deleting: HashSet<String>,
    next_lease: u64,
}

impl LifecycleState {
    fn state_of(&self, id: &str) -> DownloadState {
        self.downloads.get(id).cloned().unwrap_or_default()
    }

    fn set_state(&mut self, id: &str, next: DownloadState) {
        *self.revisions.entry(id.to_string()).or_insert(0) += 1;
        self.downloads.insert(id.to_string(), next);
    }

    fn revision(&self, id: &str) -> u64 {
        self.revisions.get(id).copied().unwrap_or(0)
    }

    fn is_current(&self, id: &str, lease: LeaseId) -> bool {
        self.active.get(id).is_some_and(|active| active.lease == lease)
    }

    fn is_generating(&self, id: &str) -> bool {
        self.generating.get(id).is_some_and(|count| *count > 0)
    }
}

struct Inner {
    catalog: Arc<ModelCatalog>,
    repository: Arc<dyn ModelRepository>,
    emitter: Arc<dyn AppEventEmitter>,
    concurrency: DownloadConcurrency,
    state: Mutex<LifecycleState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, id: &str) -> Result<&ModelDescriptor, LifecycleError> {
        self.catalog
            .resolve(id)
            .map_err(|_| LifecycleError::NotFound { id: id.to_string() })
    }

    fn emit_download(&self, event: DownloadEvent) {
        self.emitter.emit(AppEvent::download(event));
    }

    /// Drop the download slot and move the model to `NotPresent`.
    fn cancel_locked(&self, state: &mut LifecycleState, id: &str) -> bool {
        let Some(active) = state.active.remove(id) else {
            return false;
        };
        state.set_state(id, DownloadState::NotPresent);
        self.emit_download(DownloadEvent::cancelled(id));
        active.cancel.cancel();
        true
    }

    fn clear_selection_if(&self, state: &mut LifecycleState, id: &str) {
        if state.selected.as_deref() == Some(id) {
            state.selected = None;
            self.emitter.emit(AppEvent::selection_changed(None));
        }
    }
}

/// Process-wide owner of model download and selection state.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ModelLifecycleManager {
    inner: Arc<Inner>,
}

impl ModelLifecycleManager {
    /// Create a manager with the default single-download policy.
    pub fn new(
        catalog: Arc<ModelCatalog>,
        repository: Arc<dyn ModelRepository>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        Self::with_concurrency(catalog, repository, emitter, DownloadConcurrency::Single)
    }

    /// Create a manager with an explicit download concurrency policy.
    pub fn with_concurrency(
        catalog: Arc<ModelCatalog>,
        repository: Arc<dyn ModelRepository>,
        emitter: Arc<dyn AppEventEmitter>,
        concurrency: DownloadConcurrency,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                repository,
                emitter,
                concurrency,
                state: Mutex::new(LifecycleState::default()),
            }),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.inner.catalog
    }

    /// Reconcile state with what the repository actually stores.
    ///
    /// Models with a running download or deletion are left alone, as are
    /// models whose state changed while the repository was queried. Returns
    /// the number of models present afterwards.
    pub async fn refresh(&self) -> Result<usize, LifecycleError> {
        let seen: Vec<(String, u64)> = {
            let state = self.inner.lock();
            self.inner
                .catalog
                .iter()
                .map(|descriptor| {
                    let id = descriptor.id();
                    (id.to_string(), state.revision(id))
                })
                .collect()
        };

        let mut found = Vec::with_capacity(seen.len());
        for (descriptor, (id, revision)) in self.inner.catalog.iter().zip(seen) {
            let exists = self
                .inner
                .repository
                .exists(descriptor.engine_identifier())
                .await?;
            found.push((id, revision, exists));
        }

        let mut state = self.inner.lock();
        for (id, revision, exists) in found {
            if state.revision(&id) != revision || state.deleting.contains(&id) {
                debug!(model_id = %id, "State changed during refresh, skipping");
                continue;
            }
            let current = state.state_of(&id);
            if current.is_active() {
                continue;
            }
            if exists {
                if !current.is_present() {
                    state.set_state(&id, DownloadState::Present);
                }
            } else if current.is_present() {
                debug!(model_id = %id, "Artifact no longer on device");
                state.set_state(&id, DownloadState::NotPresent);
                self.inner.clear_selection_if(&mut state, &id);
            }
        }

        let present = state.downloads.values().filter(|s| s.is_present()).count();
        info!(present, "Refreshed downloaded models");
        Ok(present)
    }

    /// Catalog joined with current state, in catalog order.
    pub fn list_available(&self) -> Vec<ModelEntry> {
        let state = self.inner.lock();
        self.inner
            .catalog
            .iter()
            .map(|descriptor| ModelEntry {
                descriptor: descriptor.clone(),
                state: state.state_of(descriptor.id()),
                selected: state.selected.as_deref() == Some(descriptor.id()),
            })
            .collect()
    }

    /// Models whose artifact is on the device, in catalog order.
    pub fn list_downloaded(&self) -> Vec<ModelDescriptor> {
        let state = self.inner.lock();
        self.inner
            .catalog
            .iter()
            .filter(|descriptor| state.state_of(descriptor.id()).is_present())
            .cloned()
            .collect()
    }

    pub fn download_state(&self, id: &str) -> Result<DownloadState, LifecycleError> {
        self.inner.resolve(id)?;
        Ok(self.inner.lock().state_of(id))
    }

    pub fn selected_model(&self) -> Option<ModelDescriptor> {
        let selected = self.inner.lock().selected.clone()?;
        self.inner.catalog.resolve(&selected).ok().cloned()
    }

    /// Progress of every running download.
    pub fn active_downloads(&self) -> Vec<ActiveDownloadInfo> {
        let state = self.inner.lock();
        self.inner
            .catalog
            .iter()
            .filter_map(|descriptor| {
                state
                    .state_of(descriptor.id())
                    .fraction()
                    .map(|fraction| ActiveDownloadInfo {
                        model_id: descriptor.id().to_string(),
                        fraction,
                    })
            })
            .collect()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            models: self.list_available(),
            selected: self.inner.lock().selected.clone(),
            active_downloads: self.active_downloads(),
        }
    }

    /// Start downloading a model.
    ///
    /// The download slot is claimed immediately; the repository is only
    /// driven while the returned stream is polled. The stream yields
    /// non-decreasing fractions and ends with `1.0` on success or a single
    /// `Err` on failure or cancellation. Dropping it early cancels the
    /// download.
    pub fn download(&self, id: &str) -> Result<DownloadProgress, LifecycleError> {
        let descriptor = self.inner.resolve(id)?.clone();

        let (lease, cancel) = {
            let mut state = self.inner.lock();
            if state.deleting.contains(id) {
                return Err(LifecycleError::ModelInUse { id: id.to_string() });
            }
            let current = state.state_of(id);
            if current.is_present() {
                debug!(model_id = %id, "Download requested for present model");
                return Ok(DownloadProgress::already_present(id));
            }
            if current.is_active() {
                return Err(LifecycleError::DownloadInProgress {
                    active: id.to_string(),
                });
            }
            if self.inner.concurrency == DownloadConcurrency::Single {
                if let Some(active) = state.active.keys().next() {
                    return Err(LifecycleError::DownloadInProgress {
                        active: active.clone(),
                    });
                }
            }

            state.next_lease += 1;
            let lease = LeaseId(state.next_lease);
            let cancel = CancellationToken::new();
            state.active.insert(
                id.to_string(),
                ActiveDownload {
                    lease,
                    cancel: cancel.clone(),
                },
            );
            state.set_state(id, DownloadState::Queued);
            self.inner.emit_download(DownloadEvent::queued(id));
            (lease, cancel)
        };

        info!(model_id = %id, engine_id = %descriptor.engine_identifier(), "Download queued");

        let guard = DownloadGuard {
            inner: Arc::clone(&self.inner),
            model_id: id.to_string(),
            lease,
            done: false,
        };
        let repository = Arc::clone(&self.inner.repository);
        let engine_id = descriptor.engine_identifier().clone();

        let progress = stream! {
            let mut guard = guard;
            let mut fetch = repository.fetch(&engine_id);
            let mut last = 0.0_f64;

            loop {
                let step = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    next = fetch.next() => Some(next),
                };

                match step {
                    None => {
                        guard.finish(Outcome::Cancelled);
                        yield Err(guard.cancelled_error());
                        break;
                    }
                    Some(Some(Ok(reported))) => {
                        let fraction = if reported.is_nan() {
                            last
                        } else {
                            reported.clamp(0.0, 1.0).max(last)
                        };
                        if !guard.record_progress(fraction) {
                            yield Err(guard.cancelled_error());
                            break;
                        }
                        last = fraction;
                        // 1.0 is only reported once the model is Present
                        if fraction < 1.0 {
                            yield Ok(fraction);
                        }
                    }
                    Some(Some(Err(e))) => {
                        let reason = e.to_string();
                        if guard.finish(Outcome::Failed(reason.clone())) {
                            yield Err(LifecycleError::DownloadFailed {
                                id: guard.model_id.clone(),
                                reason,
                            });
                        } else {
                            yield Err(guard.cancelled_error());
                        }
                        break;
                    }
                    Some(None) => {
                        if guard.finish(Outcome::Completed) {
                            yield Ok(1.0);
                        } else {
                            yield Err(guard.cancelled_error());
                        }
                        break;
                    }
                }
            }
        };

        Ok(DownloadProgress {
            model_id: id.to_string(),
            stream: Box::pin(progress),
        })
    }

    /// Cancel a queued or running download.
    ///
    /// Returns `Ok(false)` if the model was not downloading.
    pub fn cancel_download(&self, id: &str) -> Result<bool, LifecycleError> {
        self.inner.resolve(id)?;
        let mut state = self.inner.lock();
        let cancelled = self.inner.cancel_locked(&mut state, id);
        if cancelled {
            info!(model_id = %id, "Download cancelled");
        }
        Ok(cancelled)
    }

    /// Delete a model's artifact.
    ///
    /// Fails with `ModelInUse` while a session is generating against the
    /// model. A running download of the model is cancelled first. Clears the
    /// selection if the model was selected.
    pub async fn delete(&self, id: &str) -> Result<(), LifecycleError> {
        let engine_id = self.inner.resolve(id)?.engine_identifier().clone();

        {
            let mut state = self.inner.lock();
            if state.is_generating(id) || state.deleting.contains(id) {
                return Err(LifecycleError::ModelInUse { id: id.to_string() });
            }
            self.inner.cancel_locked(&mut state, id);
            state.deleting.insert(id.to_string());
        }

        let removed = self.inner.repository.remove(&engine_id).await;

        let mut state = self.inner.lock();
        state.deleting.remove(id);
        if let Err(e) = removed {
            warn!(model_id = %id, error = %e, "Failed to remove model artifact");
            return Err(e.into());
        }

        state.set_state(id, DownloadState::NotPresent);
        self.inner.clear_selection_if(&mut state, id);
        self.inner.emitter.emit(AppEvent::model_removed(id));
        info!(model_id = %id, "Model deleted");
        Ok(())
    }

    /// Select a downloaded model. Re-selecting the current model is a no-op.
    pub fn select(&self, id: &str) -> Result<(), LifecycleError> {
        let mut state = self.inner.lock();
        if !state.state_of(id).is_present() {
            return Err(LifecycleError::ModelNotDownloaded { id: id.to_string() });
        }
        if state.selected.as_deref() == Some(id) {
            return Ok(());
        }
        state.selected = Some(id.to_string());
        self.inner
            .emitter
            .emit(AppEvent::selection_changed(Some(id.to_string())));
        info!(model_id = %id, "Model selected");
        Ok(())
    }

    pub fn clear_selection(&self) {
        let mut state = self.inner.lock();
        if state.selected.take().is_some() {
            self.inner.emitter.emit(AppEvent::selection_changed(None));
        }
    }

    /// Whether any session is currently generating against the model.
    pub fn is_generating(&self, id: &str) -> bool {
        self.inner.lock().is_generating(id)
    }

    /// Resolve a model that must be present on the device.
    pub fn require_present(&self, id: &str) -> Result<ModelDescriptor, LifecycleError> {
        let descriptor = self.inner.resolve(id)?.clone();
        let state = self.inner.lock();
        if !state.state_of(id).is_present() || state.deleting.contains(id) {
            return Err(LifecycleError::ModelNotDownloaded { id: id.to_string() });
        }
        Ok(descriptor)
    }

    /// Mark the model as in use for the lifetime of the returned lease.
    pub(crate) fn acquire_generation(&self, id: &str) -> Result<GenerationLease, LifecycleError> {
        self.inner.resolve(id)?;
        let mut state = self.inner.lock();
        if !state.state_of(id).is_present() || state.deleting.contains(id) {
            return Err(LifecycleError::ModelNotDownloaded { id: id.to_string() });
        }
        *state.generating.entry(id.to_string()).or_insert(0) += 1;
        Ok(GenerationLease {
            inner: Arc::clone(&self.inner),
            model_id: id.to_string(),
        })
    }
}

/// Keeps a model marked as in use; released on drop.
pub(crate) struct GenerationLease {
    inner: Arc<Inner>,
    model_id: String,
}

impl Drop for GenerationLease {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if let Some(count) = state.generating.get_mut(&self.model_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.generating.remove(&self.model_id);
            }
        }
    }
}

enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Commits download state on behalf of one stream.
///
/// Every commit is checked against the lease so a stream that was cancelled
/// or superseded can no longer change state. Dropping an unfinished guard
/// cancels the download.
struct DownloadGuard {
    inner: Arc<Inner>,
    model_id: String,
    lease: LeaseId,
    done: bool,
}

impl DownloadGuard {
    fn cancelled_error(&self) -> LifecycleError {
        LifecycleError::Cancelled {
            id: self.model_id.clone(),
        }
    }

    fn record_progress(&self, fraction: f64) -> bool {
        let mut state = self.inner.lock();
        if !state.is_current(&self.model_id, self.lease) {
            return false;
        }
        if state.state_of(&self.model_id) == DownloadState::Queued {
            self.inner
                .emit_download(DownloadEvent::started(&self.model_id));
        }
        state.set_state(&self.model_id, DownloadState::InProgress { fraction });
        self.inner
            .emit_download(DownloadEvent::progress(&self.model_id, fraction));
        debug!(model_id = %self.model_id, fraction, "Download progress");
        true
    }

    /// Commit the terminal state. Returns false if the lease was stale.
    fn finish(&mut self, outcome: Outcome) -> bool {
        self.done = true;
        let mut state = self.inner.lock();
        if !state.is_current(&self.model_id, self.lease) {
            return false;
        }
        state.active.remove(&self.model_id);

        let id = self.model_id.clone();
        match outcome {
            Outcome::Completed => {
                state.set_state(&id, DownloadState::Present);
                self.inner.emit_download(DownloadEvent::completed(&id));
                info!(model_id = %id, "Download completed");
            }
            Outcome::Failed(reason) => {
                warn!(model_id = %id, error = %reason, "Download failed");
                state.set_state(
                    &id,
                    DownloadState::Failed {
                        reason: reason.clone(),
                    },
                );
                self.inner.emit_download(DownloadEvent::failed(&id, reason));
            }
            Outcome::Cancelled => {
                state.set_state(&id, DownloadState::NotPresent);
                self.inner.emit_download(DownloadEvent::cancelled(&id));
                info!(model_id = %id, "Download cancelled");
            }
        }
        true
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if !self.done {
            self.finish(Outcome::Cancelled);
        }
    }
}

/// Lazy sequence of download progress fractions for one model.
pub struct DownloadProgress {
    model_id: String,
    stream: BoxStream<'static, Result<f64, LifecycleError>>,
}

impl DownloadProgress {
    fn already_present(id: &str) -> Self {
        Self {
            model_id: id.to_string(),
            stream: Box::pin(futures_util::stream::once(async { Ok(1.0) })),
        }
    }

    /// Catalog id of the model being downloaded.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Drive the download to the end, returning the last fraction.
    pub async fn wait(mut self) -> Result<f64, LifecycleError> {
        let mut last = 0.0;
        while let Some(item) = self.stream.next().await {
            last = item?;
        }
        Ok(last)
    }
}

impl Stream for DownloadProgress {
    type Item = Result<f64, LifecycleError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadProgress")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}
