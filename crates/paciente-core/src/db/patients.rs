//! Patient database operations.

use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::PatientRecord;

const PATIENT_COLUMNS: &str =
    "local_id, name, age, sex, photo, classification_label, created_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRecord> {
    Ok(PatientRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        sex: row.get(3)?,
        photo: row.get(4)?,
        classification_label: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Surface CHECK / UNIQUE / NOT NULL failures as constraint errors.
fn map_constraint(e: rusqlite::Error) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
            DbError::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => DbError::Sqlite(e),
    }
}

// `%` and `_` in user text match literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &PatientRecord) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO patients (
                    local_id, name, age, sex, photo, classification_label, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    patient.id,
                    patient.name,
                    patient.age,
                    patient.sex,
                    patient.photo,
                    patient.classification_label,
                    patient.created_at,
                ],
            )
            .map_err(map_constraint)?;
        Ok(())
    }

    /// Get a patient by local ID.
    pub fn get_patient(&self, local_id: &str) -> DbResult<Option<PatientRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE local_id = ?"),
                [local_id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all patients in insertion order.
    pub fn list_patients(&self) -> DbResult<Vec<PatientRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PATIENT_COLUMNS} FROM patients ORDER BY rowid"))?;

        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Search patients by name (prefix match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<PatientRecord>> {
        let pattern = format!("{}%", escape_like(query));
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY name
            LIMIT ?
            "#
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of saved patients.
    pub fn count_patients(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
