//! Pending draft for the add-record flow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::patient::PatientRecord;

/// Where a draft is in the add-record flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DraftPhase {
    /// Nothing entered yet
    Empty,
    /// Some fields edited, no photo
    FieldsPartial,
    /// Photo selected, classification in flight
    PhotoAttached,
    /// Classification finished (label or sentinel)
    Classified,
    /// Persisted; the draft is closed
    Saved,
    /// Persisting failed; the draft is kept for a retry
    SaveFailed,
}

/// Why a draft cannot be saved.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssue {
    #[error("name is required")]
    MissingName,

    #[error("age is required")]
    MissingAge,

    #[error("sex is required")]
    MissingSex,

    #[error("photo is required")]
    MissingPhoto,

    #[error("age must be a whole number between 0 and 32767, got {0:?}")]
    InvalidAge(String),

    #[error("draft is already closed")]
    SessionClosed,
}

/// Parse an age typed by the user.
pub fn parse_age(text: &str) -> Result<i16, ValidationIssue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationIssue::MissingAge);
    }
    match trimmed.parse::<i16>() {
        Ok(age) if age >= 0 => Ok(age),
        _ => Err(ValidationIssue::InvalidAge(text.to_string())),
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// In-progress form state. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDraft {
    /// Id the saved record will carry
    pub record_id: String,
    pub name: String,
    pub age_text: String,
    pub sex: String,
    pub photo: Option<Vec<u8>>,
    /// Label for the current photo; empty until classified
    pub classification_label: String,
    /// Generation of the photo selection the photo and label belong to
    pub selection: u64,
    pub phase: DraftPhase,
}

impl Default for PendingDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingDraft {
    pub fn new() -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            age_text: String::new(),
            sex: String::new(),
            photo: None,
            classification_label: String::new(),
            selection: 0,
            phase: DraftPhase::Empty,
        }
    }

    /// Saved drafts take no further edits.
    pub fn is_closed(&self) -> bool {
        self.phase == DraftPhase::Saved
    }

    fn touch_fields(&mut self) {
        if self.phase == DraftPhase::Empty {
            self.phase = DraftPhase::FieldsPartial;
        }
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
        self.touch_fields();
    }

    pub fn set_age_text(&mut self, age_text: String) {
        self.age_text = age_text;
        self.touch_fields();
    }

    pub fn set_sex(&mut self, sex: String) {
        self.sex = sex;
        self.touch_fields();
    }

    /// Attach a newly selected photo. Any previous label is dropped.
    pub fn attach_photo(&mut self, selection: u64, photo: Vec<u8>) {
        self.photo = Some(photo);
        self.classification_label.clear();
        self.selection = selection;
        self.phase = DraftPhase::PhotoAttached;
    }

    /// Record the classification result for `selection`.
    ///
    /// Returns `false` and changes nothing if the result is stale or the
    /// draft is closed. `photo` replaces the stored bytes when given.
    pub fn apply_classification(
        &mut self,
        selection: u64,
        label: String,
        photo: Option<Vec<u8>>,
    ) -> bool {
        if self.is_closed() || selection != self.selection {
            return false;
        }
        if let Some(photo) = photo {
            self.photo = Some(photo);
        }
        self.classification_label = label;
        self.phase = DraftPhase::Classified;
        true
    }

    /// Fields that are still blank, in form order.
    pub fn missing_fields(&self) -> Vec<ValidationIssue> {
        let mut missing = Vec::new();
        if is_blank(&self.name) {
            missing.push(ValidationIssue::MissingName);
        }
        if is_blank(&self.age_text) {
            missing.push(ValidationIssue::MissingAge);
        }
        if is_blank(&self.sex) {
            missing.push(ValidationIssue::MissingSex);
        }
        if self.photo.as_ref().map_or(true, |p| p.is_empty()) {
            missing.push(ValidationIssue::MissingPhoto);
        }
        missing
    }

    /// Whether the save action should be enabled.
    pub fn can_save(&self) -> bool {
        !self.is_closed() && self.missing_fields().is_empty()
    }

    /// Build the record to persist.
    pub fn to_record(&self) -> Result<PatientRecord, ValidationIssue> {
        if self.is_closed() {
            return Err(ValidationIssue::SessionClosed);
        }
        if let Some(issue) = self.missing_fields().into_iter().next() {
            return Err(issue);
        }
        let age = parse_age(&self.age_text)?;

        let mut record = PatientRecord::with_id(
            self.record_id.clone(),
            self.name.trim().to_string(),
            age,
            self.sex.trim().to_string(),
        );
        record.photo = self.photo.clone();
        record.classification_label = self.classification_label.clone();
        Ok(record)
    }

    /// Close the draft after a successful save, dropping its contents.
    pub fn close(&mut self) {
        *self = Self {
            phase: DraftPhase::Saved,
            selection: self.selection,
            ..Self::new()
        };
    }
}
