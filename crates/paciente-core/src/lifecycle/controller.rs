//! Add-record flow controller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use paciente_classifier::{Classifier, CLASSIFY_FAILED_LABEL};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pipeline::{classify_photo, PhotoOutcome};
use super::{LifecycleError, LifecycleResult, SaveOutcome};
use crate::config::CoreConfig;
use crate::db::PatientRepository;
use crate::models::{DraftPhase, PendingDraft};

fn lock_draft(draft: &Mutex<PendingDraft>) -> MutexGuard<'_, PendingDraft> {
    draft.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InflightClassification {
    selection: u64,
    cancel: CancellationToken,
    // None once handed to a waiter by `take_pending`
    handle: Option<JoinHandle<()>>,
}

/// Drives one pending draft from empty form to saved record.
///
/// Each photo selection cancels the previous classification and starts a new
/// one; a result is only applied if it belongs to the newest selection.
/// Dropping the controller cancels whatever is still running.
pub struct RecordController {
    repository: Arc<dyn PatientRepository>,
    classifier: Arc<Classifier>,
    config: Arc<CoreConfig>,
    runtime: Handle,
    draft: Arc<Mutex<PendingDraft>>,
    next_selection: u64,
    inflight: Option<InflightClassification>,
}

impl RecordController {
    /// Open a fresh draft. Background work is spawned on `runtime`.
    pub fn new(
        repository: Arc<dyn PatientRepository>,
        classifier: Arc<Classifier>,
        config: CoreConfig,
        runtime: Handle,
    ) -> Self {
        let draft = PendingDraft::new();
        tracing::debug!(record_id = %draft.record_id, "draft opened");
        Self {
            repository,
            classifier,
            config: Arc::new(config.sanitized()),
            runtime,
            draft: Arc::new(Mutex::new(draft)),
            next_selection: 0,
            inflight: None,
        }
    }

    /// Snapshot of the draft.
    pub fn draft(&self) -> PendingDraft {
        lock_draft(&self.draft).clone()
    }

    pub fn state(&self) -> DraftPhase {
        lock_draft(&self.draft).phase
    }

    /// Label for the current photo; empty while unclassified.
    pub fn classification_label(&self) -> String {
        lock_draft(&self.draft).classification_label.clone()
    }

    pub fn can_save(&self) -> bool {
        lock_draft(&self.draft).can_save()
    }

    pub fn is_classifying(&self) -> bool {
        self.inflight.is_some() && lock_draft(&self.draft).phase == DraftPhase::PhotoAttached
    }

    /// Hand out the join handle of the current classification, if nobody has
    /// taken it yet. Lets a caller await the result without borrowing the
    /// controller; a newer `select_photo` still cancels the task.
    pub fn take_pending(&mut self) -> Option<JoinHandle<()>> {
        self.inflight.as_mut().and_then(|inflight| inflight.handle.take())
    }

    fn edit(&self, field: &str, apply: impl FnOnce(&mut PendingDraft)) {
        let mut draft = lock_draft(&self.draft);
        if draft.is_closed() {
            tracing::warn!(field, "edit ignored on a closed draft");
            return;
        }
        apply(&mut draft);
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.edit("name", |d| d.set_name(name));
    }

    pub fn set_age_text(&self, age_text: impl Into<String>) {
        let age_text = age_text.into();
        self.edit("age", |d| d.set_age_text(age_text));
    }

    pub fn set_sex(&self, sex: impl Into<String>) {
        let sex = sex.into();
        self.edit("sex", |d| d.set_sex(sex));
    }

    /// Attach a newly picked photo and classify it in the background.
    pub fn select_photo(&mut self, photo: Vec<u8>) {
        if let Some(previous) = self.inflight.take() {
            previous.cancel.cancel();
            tracing::debug!(selection = previous.selection, "superseded classification cancelled");
        }

        let selection = {
            let mut draft = lock_draft(&self.draft);
            if draft.is_closed() {
                tracing::warn!("photo selected on a closed draft");
                return;
            }
            self.next_selection += 1;
            draft.attach_photo(self.next_selection, photo.clone());
            self.next_selection
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let draft = Arc::clone(&self.draft);
        let classifier = Arc::clone(&self.classifier);
        let config = Arc::clone(&self.config);
        let runtime = self.runtime.clone();

        let handle = self.runtime.spawn(async move {
            let work =
                runtime.spawn_blocking(move || classify_photo(&classifier, &photo, &config));

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(selection, "classification cancelled");
                }
                joined = work => {
                    let outcome = joined.unwrap_or_else(|e| {
                        tracing::warn!("classification worker failed: {e}");
                        PhotoOutcome {
                            label: CLASSIFY_FAILED_LABEL.to_string(),
                            normalized_photo: None,
                        }
                    });
                    let applied = lock_draft(&draft).apply_classification(
                        selection,
                        outcome.label,
                        outcome.normalized_photo,
                    );
                    if applied {
                        tracing::debug!(selection, "classification applied");
                    } else {
                        tracing::debug!(selection, "stale classification dropped");
                    }
                }
            }
        });

        self.inflight = Some(InflightClassification {
            selection,
            cancel,
            handle: Some(handle),
        });
    }

    /// Wait for the current classification, if any, and return the label.
    pub async fn wait_for_classification(&mut self) -> String {
        while let Some(handle) = self.take_pending() {
            await_classification(handle).await;
        }
        self.classification_label()
    }

    /// Validate and persist the draft.
    ///
    /// Waits for a pending classification first so the record carries the
    /// label of the photo being saved. Validation problems come back as
    /// [`SaveOutcome::Rejected`] with nothing written; store failures as
    /// [`LifecycleError::Persistence`] with the draft kept for a retry.
    pub async fn save(&mut self) -> LifecycleResult<SaveOutcome> {
        self.wait_for_classification().await;

        let record = lock_draft(&self.draft).to_record();
        let record = match record {
            Ok(record) => record,
            Err(issue) => {
                tracing::info!(%issue, "save rejected");
                return Ok(SaveOutcome::Rejected(issue));
            }
        };

        let repository = Arc::clone(&self.repository);
        let joined = self
            .runtime
            .spawn_blocking(move || repository.add(&record))
            .await;

        match joined {
            Ok(Ok(stored)) => {
                lock_draft(&self.draft).close();
                Ok(SaveOutcome::Saved(stored))
            }
            Ok(Err(e)) => {
                lock_draft(&self.draft).phase = DraftPhase::SaveFailed;
                tracing::error!("saving patient failed: {e}");
                Err(LifecycleError::Persistence(e))
            }
            Err(e) => {
                lock_draft(&self.draft).phase = DraftPhase::SaveFailed;
                tracing::error!("save worker failed: {e}");
                Err(LifecycleError::Worker(e.to_string()))
            }
        }
    }

    /// Discard the draft without persisting anything.
    pub fn cancel(self) {
        tracing::debug!(state = ?self.state(), "draft discarded");
    }
}

impl Drop for RecordController {
    fn drop(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            inflight.cancel.cancel();
            if let Some(handle) = inflight.handle {
                handle.abort();
            }
        }
    }
}

/// Await a handle obtained from [`RecordController::take_pending`].
pub async fn await_classification(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            tracing::warn!("classification task failed: {e}");
        }
    }
}
