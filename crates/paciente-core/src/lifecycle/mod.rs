//! Record lifecycle: fields → photo → classification → save.

mod controller;
mod pipeline;

pub use controller::*;
pub use pipeline::*;

use thiserror::Error;

use crate::db::DbError;
use crate::models::{PatientRecord, ValidationIssue};

/// Lifecycle errors. Only persistence problems surface here; classification
/// problems degrade to sentinel labels.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error("Background worker failed: {0}")]
    Worker(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// What a save attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Record persisted; the draft is closed
    Saved(PatientRecord),
    /// Nothing persisted; the draft is unchanged
    Rejected(ValidationIssue),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}
