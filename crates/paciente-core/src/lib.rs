//! Paciente Core Library
//!
//! Local-first patient intake: name, age, sex and a photo, with the photo
//! classified by an on-device image model.
//!
//! # Architecture
//!
//! ```text
//!   Photo picker (host)
//!          │ bytes
//!          ▼
//!   RecordController::select_photo ──► cancel previous selection
//!          │
//!          ▼  (blocking pool)
//!   imaging::decode → imaging::prepare (224x224 XRGB) → Classifier::classify
//!          │
//!          ▼
//!   [DRAFT: label for newest selection only]
//!          │
//!     user taps save
//!          │
//!          ▼
//!   validate ──► Rejected (nothing written)
//!          │
//!          ▼
//!   PatientRepository::add ──► SQLite `patients`
//! ```
//!
//! # Core Principle
//!
//! **Classification never blocks the form.** Decode and model failures turn
//! into sentinel labels; only store failures surface as errors.
//!
//! # Modules
//!
//! - [`db`]: SQLite store and the [`db::PatientRepository`] interface
//! - [`models`]: Domain types (PatientRecord, PendingDraft)
//! - [`imaging`]: Photo decode, resize and pixel layout
//! - [`lifecycle`]: Add-record controller
//! - [`config`]: Runtime configuration
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod db;
pub mod imaging;
pub mod lifecycle;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use config::{CoreConfig, MAX_INPUT_SIZE};
pub use db::{Database, PatientRepository};
pub use lifecycle::{LifecycleError, RecordController, SaveOutcome};
pub use models::{DraftPhase, PatientRecord, PendingDraft, ValidationIssue};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use paciente_classifier::{
    Classifier, ClassifierError, ClassifierResult, ImageModel, PixelBuffer, PixelFormat,
    Prediction,
};
use tokio::runtime::Runtime;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PacienteError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Draft closed: {0}")]
    SessionClosed(String),
}

impl From<db::DbError> for PacienteError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(id) => PacienteError::NotFound(id),
            other => PacienteError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PacienteError {
    fn from(e: serde_json::Error) -> Self {
        PacienteError::SerializationError(e.to_string())
    }
}

impl From<lifecycle::LifecycleError> for PacienteError {
    fn from(e: lifecycle::LifecycleError) -> Self {
        match e {
            lifecycle::LifecycleError::Persistence(db) => db.into(),
            lifecycle::LifecycleError::Worker(msg) => PacienteError::RuntimeError(msg),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PacienteError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PacienteError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PacienteError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        PacienteError::InferenceError(e.reason)
    }
}

// =========================================================================
// Foreign Model Interface
// =========================================================================

/// Image model implemented by the host app (e.g. wrapping an on-device model).
#[uniffi::export(with_foreign)]
pub trait ImageModelCallback: Send + Sync {
    /// Run one forward pass over a prepared buffer.
    fn predict(&self, pixels: FfiPixelBuffer) -> Result<FfiPrediction, PacienteError>;
}

struct ForeignModel(Arc<dyn ImageModelCallback>);

impl ImageModel for ForeignModel {
    fn predict(&self, input: &PixelBuffer) -> ClassifierResult<Prediction> {
        self.0
            .predict(input.into())
            .map(Into::into)
            .map_err(|e| match e {
                PacienteError::InferenceError(msg) => ClassifierError::Inference(msg),
                other => ClassifierError::Inference(other.to_string()),
            })
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the log subscriber. Safe to call more than once.
#[uniffi::export]
pub fn init_logging(filter: String) {
    logging::init(&filter);
}

/// Default configuration (224x224 XRGB input, JPEG quality 80).
#[uniffi::export]
pub fn default_config() -> FfiCoreConfig {
    CoreConfig::default().into()
}

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(
    path: String,
    config: FfiCoreConfig,
    model: Arc<dyn ImageModelCallback>,
) -> Result<Arc<PacienteCore>, PacienteError> {
    let db = Database::open(&path)?;
    let classifier = Classifier::with_model(Arc::new(ForeignModel(model)));
    PacienteCore::new(db, classifier, config.try_into()?)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory(
    config: FfiCoreConfig,
    model: Arc<dyn ImageModelCallback>,
) -> Result<Arc<PacienteCore>, PacienteError> {
    let db = Database::open_in_memory()?;
    let classifier = Classifier::with_model(Arc::new(ForeignModel(model)));
    PacienteCore::new(db, classifier, config.try_into()?)
}

/// Open a database and classify with a bundled ONNX model.
///
/// `model_config_json` is an [`paciente_classifier::OnnxModelConfig`].
#[cfg(feature = "onnx")]
#[uniffi::export]
pub fn open_database_with_onnx(
    path: String,
    config: FfiCoreConfig,
    model_config_json: String,
) -> Result<Arc<PacienteCore>, PacienteError> {
    let model_config = paciente_classifier::OnnxModelConfig::from_json(&model_config_json)
        .map_err(|e| PacienteError::InvalidInput(e.to_string()))?;
    let db = Database::open(&path)?;
    let classifier = Classifier::new(paciente_classifier::OnnxModelLoader::new(model_config));
    PacienteCore::new(db, classifier, config.try_into()?)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe core handle for FFI.
#[derive(uniffi::Object)]
pub struct PacienteCore {
    db: Arc<Mutex<Database>>,
    classifier: Arc<Classifier>,
    config: CoreConfig,
    runtime: Arc<Runtime>,
}

impl PacienteCore {
    fn new(
        db: Database,
        classifier: Classifier,
        config: CoreConfig,
    ) -> Result<Arc<Self>, PacienteError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("paciente-worker")
            .enable_all()
            .build()
            .map_err(|e| PacienteError::RuntimeError(e.to_string()))?;

        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            classifier: Arc::new(classifier),
            config,
            runtime: Arc::new(runtime),
        }))
    }
}

#[uniffi::export]
impl PacienteCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// All saved patients, oldest first.
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, PacienteError> {
        let patients = self.db.list()?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    /// Get a patient by local ID.
    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, PacienteError> {
        let db = self.db.lock()?;
        let patient = db.get_patient(&id)?;
        Ok(patient.map(|p| p.into()))
    }

    /// Search patients by name.
    pub fn search_patients(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiPatient>, PacienteError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    pub fn patient_count(&self) -> Result<u64, PacienteError> {
        let db = self.db.lock()?;
        Ok(db.count_patients()?)
    }

    // =========================================================================
    // Draft Operations
    // =========================================================================

    /// Open the add-record flow.
    pub fn begin_draft(&self) -> Arc<DraftSession> {
        let repository: Arc<dyn PatientRepository> = self.db.clone();
        let controller = RecordController::new(
            repository,
            Arc::clone(&self.classifier),
            self.config.clone(),
            self.runtime.handle().clone(),
        );
        Arc::new(DraftSession {
            controller: Mutex::new(Some(controller)),
            runtime: Arc::clone(&self.runtime),
        })
    }
}

/// One open add-record form.
#[derive(uniffi::Object)]
pub struct DraftSession {
    controller: Mutex<Option<RecordController>>,
    runtime: Arc<Runtime>,
}

impl DraftSession {
    fn with_controller<T>(
        &self,
        f: impl FnOnce(&mut RecordController) -> T,
    ) -> Result<T, PacienteError> {
        let mut guard = self.controller.lock()?;
        let controller = guard
            .as_mut()
            .ok_or_else(|| PacienteError::SessionClosed("draft was cancelled".into()))?;
        Ok(f(controller))
    }

    // Await classifications with the session unlocked so a newer
    // `select_photo` can supersede the one being waited on.
    fn wait_unlocked(&self) -> Result<(), PacienteError> {
        while let Some(handle) = self.with_controller(|c| c.take_pending())? {
            self.runtime.block_on(lifecycle::await_classification(handle));
        }
        Ok(())
    }
}

#[uniffi::export]
impl DraftSession {
    pub fn set_name(&self, name: String) -> Result<(), PacienteError> {
        self.with_controller(|c| c.set_name(name))
    }

    pub fn set_age_text(&self, age_text: String) -> Result<(), PacienteError> {
        self.with_controller(|c| c.set_age_text(age_text))
    }

    pub fn set_sex(&self, sex: String) -> Result<(), PacienteError> {
        self.with_controller(|c| c.set_sex(sex))
    }

    /// Attach the picked photo; classification runs in the background.
    pub fn select_photo(&self, photo: Vec<u8>) -> Result<(), PacienteError> {
        self.with_controller(|c| c.select_photo(photo))
    }

    /// Block until the current classification finishes; returns the label.
    pub fn wait_for_classification(&self) -> Result<String, PacienteError> {
        self.wait_unlocked()?;
        self.with_controller(|c| c.classification_label())
    }

    /// Label for the current photo; empty while unclassified.
    pub fn classification_label(&self) -> Result<String, PacienteError> {
        self.with_controller(|c| c.classification_label())
    }

    pub fn state(&self) -> Result<FfiDraftState, PacienteError> {
        self.with_controller(|c| c.state().into())
    }

    /// Whether the save button should be enabled.
    pub fn can_save(&self) -> bool {
        self.with_controller(|c| c.can_save()).unwrap_or(false)
    }

    pub fn save(&self) -> Result<FfiSaveOutcome, PacienteError> {
        loop {
            self.wait_unlocked()?;

            let mut guard = self.controller.lock()?;
            let controller = guard
                .as_mut()
                .ok_or_else(|| PacienteError::SessionClosed("draft was cancelled".into()))?;
            // A photo picked since the wait: go back and wait unlocked.
            if let Some(handle) = controller.take_pending() {
                drop(guard);
                self.runtime.block_on(lifecycle::await_classification(handle));
                continue;
            }
            let outcome = self.runtime.block_on(controller.save())?;
            return Ok(outcome.into());
        }
    }

    /// Discard the draft. Later calls fail with `SessionClosed`.
    pub fn cancel(&self) -> Result<(), PacienteError> {
        if let Some(controller) = self.controller.lock()?.take() {
            controller.cancel();
        }
        Ok(())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCoreConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub pixel_format: String,
    pub normalize_photo: bool,
    pub photo_quality: u8,
}

impl From<CoreConfig> for FfiCoreConfig {
    fn from(config: CoreConfig) -> Self {
        Self {
            input_width: config.input_width,
            input_height: config.input_height,
            pixel_format: config.pixel_format.as_str().to_string(),
            normalize_photo: config.normalize_photo,
            photo_quality: config.photo_quality,
        }
    }
}

impl TryFrom<FfiCoreConfig> for CoreConfig {
    type Error = PacienteError;

    fn try_from(config: FfiCoreConfig) -> Result<Self, Self::Error> {
        let pixel_format = PixelFormat::parse(&config.pixel_format).ok_or_else(|| {
            PacienteError::InvalidInput(format!("unknown pixel format: {}", config.pixel_format))
        })?;
        let size_ok = |side: u32| (1..=MAX_INPUT_SIZE).contains(&side);
        if !size_ok(config.input_width) || !size_ok(config.input_height) {
            return Err(PacienteError::InvalidInput(format!(
                "input size must be between 1 and {}, got {}x{}",
                MAX_INPUT_SIZE,
                config.input_width,
                config.input_height
            )));
        }
        Ok(CoreConfig {
            input_width: config.input_width,
            input_height: config.input_height,
            pixel_format,
            normalize_photo: config.normalize_photo,
            photo_quality: config.photo_quality,
        }
        .sanitized())
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub age: i16,
    pub sex: String,
    pub photo: Option<Vec<u8>>,
    pub classification_label: String,
    pub created_at: String,
}

impl From<PatientRecord> for FfiPatient {
    fn from(patient: PatientRecord) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
            age: patient.age,
            sex: patient.sex,
            photo: patient.photo,
            classification_label: patient.classification_label,
            created_at: patient.created_at,
        }
    }
}

/// FFI-safe draft state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiDraftState {
    Empty,
    FieldsPartial,
    PhotoAttached,
    Classified,
    Saved,
    SaveFailed,
}

impl From<DraftPhase> for FfiDraftState {
    fn from(phase: DraftPhase) -> Self {
        match phase {
            DraftPhase::Empty => FfiDraftState::Empty,
            DraftPhase::FieldsPartial => FfiDraftState::FieldsPartial,
            DraftPhase::PhotoAttached => FfiDraftState::PhotoAttached,
            DraftPhase::Classified => FfiDraftState::Classified,
            DraftPhase::Saved => FfiDraftState::Saved,
            DraftPhase::SaveFailed => FfiDraftState::SaveFailed,
        }
    }
}

/// FFI-safe save result.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiSaveOutcome {
    Saved { patient: FfiPatient },
    Rejected { reason: String },
}

impl From<SaveOutcome> for FfiSaveOutcome {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Saved(patient) => FfiSaveOutcome::Saved {
                patient: patient.into(),
            },
            SaveOutcome::Rejected(issue) => FfiSaveOutcome::Rejected {
                reason: issue.to_string(),
            },
        }
    }
}

/// FFI-safe pixel buffer handed to the host model.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPixelBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub pixel_format: String,
    pub data: Vec<u8>,
}

impl From<&PixelBuffer> for FfiPixelBuffer {
    fn from(buffer: &PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            bytes_per_row: buffer.bytes_per_row() as u32,
            pixel_format: buffer.format().as_str().to_string(),
            data: buffer.data().to_vec(),
        }
    }
}

/// FFI-safe class probability.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClassProbability {
    pub label: String,
    pub probability: f64,
}

/// FFI-safe model output. Leave `class_probabilities` empty when the model
/// only reports a label.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrediction {
    pub class_label: Option<String>,
    pub class_probabilities: Vec<FfiClassProbability>,
}

impl From<FfiPrediction> for Prediction {
    fn from(prediction: FfiPrediction) -> Self {
        let probs = prediction.class_probabilities;
        Prediction {
            class_label: prediction.class_label,
            class_probabilities: if probs.is_empty() {
                None
            } else {
                Some(probs.into_iter().map(|p| (p.label, p.probability)).collect())
            },
        }
    }
}
