//! Narrow patient store interface used by the add-record flow.

use std::sync::Mutex;

use super::{Database, DbError, DbResult};
use crate::models::PatientRecord;

/// Create and list persisted patients.
///
/// Implementations validate nothing beyond what the store itself enforces.
pub trait PatientRepository: Send + Sync {
    /// All saved patients, in insertion order.
    fn list(&self) -> DbResult<Vec<PatientRecord>>;

    /// Persist a new patient and return it as stored.
    fn add(&self, record: &PatientRecord) -> DbResult<PatientRecord>;
}

impl PatientRepository for Mutex<Database> {
    fn list(&self) -> DbResult<Vec<PatientRecord>> {
        let db = self.lock().map_err(|_| DbError::LockPoisoned)?;
        db.list_patients()
    }

    fn add(&self, record: &PatientRecord) -> DbResult<PatientRecord> {
        let db = self.lock().map_err(|_| DbError::LockPoisoned)?;
        db.insert_patient(record)?;
        let stored = db
            .get_patient(&record.id)?
            .ok_or_else(|| DbError::NotFound(record.id.clone()))?;
        tracing::info!(patient_id = %stored.id, "patient saved");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_repo() -> Mutex<Database> {
        Mutex::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_add_then_list_roundtrip() {
        let repo = setup_repo();

        let mut record = PatientRecord::new("Ana".into(), 29, "F".into());
        record.photo = Some(vec![1, 2, 3, 4]);
        record.classification_label = "laceration".into();

        let stored = repo.add(&record).unwrap();
        assert_eq!(stored, record);

        let listed = repo.list().unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[test]
    fn test_add_does_not_deduplicate_content() {
        let repo = setup_repo();

        repo.add(&PatientRecord::new("Ana".into(), 29, "F".into()))
            .unwrap();
        repo.add(&PatientRecord::new("Ana".into(), 29, "F".into()))
            .unwrap();

        assert_eq!(repo.list().unwrap().len(), 2);
    }

    #[test]
    fn test_store_rejection_surfaces() {
        let repo = setup_repo();
        let record = PatientRecord::new("Ana".into(), -1, "F".into());

        assert!(matches!(repo.add(&record), Err(DbError::Constraint(_))));
        assert!(repo.list().unwrap().is_empty());
    }
}
