//! Patient models.

use serde::{Deserialize, Serialize};

/// A saved patient entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    /// Local UUID, minted when the add-record flow opens
    pub id: String,
    /// Patient name
    pub name: String,
    /// Age in years (0-32767)
    pub age: i16,
    /// Sex, free text
    pub sex: String,
    /// Compressed photo bytes
    pub photo: Option<Vec<u8>>,
    /// Label derived from the photo; empty until classified
    pub classification_label: String,
    /// Creation timestamp
    pub created_at: String,
}

impl PatientRecord {
    /// Create a new record with a fresh id and no photo.
    pub fn new(name: String, age: i16, sex: String) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, age, sex)
    }

    /// Create a record under an id minted elsewhere.
    pub fn with_id(id: String, name: String, age: i16, sex: String) -> Self {
        Self {
            id,
            name,
            age,
            sex,
            photo: None,
            classification_label: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Check if the photo has been through the classifier.
    pub fn is_classified(&self) -> bool {
        !self.classification_label.is_empty()
    }

    /// Label for list display.
    pub fn display_label(&self) -> &str {
        if self.is_classified() {
            &self.classification_label
        } else {
            UNCLASSIFIED_LABEL
        }
    }
}

/// Shown in place of an empty classification label.
pub const UNCLASSIFIED_LABEL: &str = "unclassified";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = PatientRecord::new("Ana".into(), 29, "F".into());
        assert_eq!(record.name, "Ana");
        assert_eq!(record.age, 29);
        assert!(!record.has_photo());
        assert!(!record.is_classified());
        assert_eq!(record.id.len(), 36); // UUID format
    }

    #[test]
    fn test_display_label() {
        let mut record = PatientRecord::new("Ana".into(), 29, "F".into());
        assert_eq!(record.display_label(), "unclassified");

        record.classification_label = "laceration".into();
        assert_eq!(record.display_label(), "laceration");
    }

    #[test]
    fn test_empty_photo_is_not_a_photo() {
        let mut record = PatientRecord::new("Ana".into(), 29, "F".into());
        record.photo = Some(Vec::new());
        assert!(!record.has_photo());
    }
}
